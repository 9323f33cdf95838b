use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
///
/// Users and profiles live in the account service; only their ids appear here.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Ideas, projects and collaboration requests

CREATE TABLE projects (
    id BLOB PRIMARY KEY,
    owner_id BLOB NOT NULL,
    title TEXT NOT NULL DEFAULT 'Default title',
    description TEXT NOT NULL DEFAULT 'Default description',
    chat_id BLOB,
    created_at TEXT NOT NULL
);

CREATE INDEX idx_projects_owner ON projects(owner_id);

CREATE TABLE project_members (
    project_id BLOB NOT NULL,
    profile_id BLOB NOT NULL,
    PRIMARY KEY (project_id, profile_id),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE ideas (
    id BLOB PRIMARY KEY,
    author_id BLOB NOT NULL,
    title TEXT NOT NULL,
    project_id BLOB,
    created_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE SET NULL
);

CREATE INDEX idx_ideas_author ON ideas(author_id);

CREATE TABLE collaboration_requests (
    id BLOB PRIMARY KEY,
    idea_id BLOB NOT NULL,
    requester_id BLOB NOT NULL,
    chat_id BLOB,
    status TEXT NOT NULL DEFAULT 'Pending',
    feedback TEXT,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (idea_id) REFERENCES ideas(id) ON DELETE CASCADE
);

CREATE INDEX idx_collaboration_requester_idea ON collaboration_requests(requester_id, idea_id, status);
",
        ),
        M::up(
            "-- Migration 2: Chat rooms and transcripts

CREATE TABLE chats (
    id BLOB PRIMARY KEY,
    owner_id BLOB,
    idea_id BLOB,
    collaboration_request_id BLOB,
    project_id BLOB,
    created_at TEXT NOT NULL
);

CREATE INDEX idx_chats_project ON chats(project_id);

CREATE TABLE chat_members (
    chat_id BLOB NOT NULL,
    profile_id BLOB NOT NULL,
    PRIMARY KEY (chat_id, profile_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX idx_chat_members_profile ON chat_members(profile_id);

CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id BLOB NOT NULL,
    sender_id BLOB NOT NULL,
    content TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX idx_messages_chat ON messages(chat_id, id);
",
        ),
        M::up(
            "-- Migration 3: Notifications

CREATE TABLE notifications (
    id BLOB PRIMARY KEY,
    user_profile_id BLOB NOT NULL,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    read_at TEXT,
    actor_profile_id BLOB,
    related_entity_id TEXT,
    related_entity_type TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX idx_notifications_user ON notifications(user_profile_id, created_at);
",
        ),
    ])
}
