//! Projects and their shared chat rooms.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

use super::chats::{self, NewChat};
use super::ideas;
use super::models::{Idea, Project};
use super::StoreError;

/// Outcome of provisioning a project or chat room for a new collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provision {
    pub id: Uuid,
    /// A new record was created rather than an existing one extended.
    pub created: bool,
    /// The collaborator was not a member before this call.
    pub newly_added: bool,
}

pub fn find_project(conn: &Connection, project_id: Uuid) -> Result<Option<Project>, StoreError> {
    let project = conn
        .query_row(
            "SELECT id, owner_id, title, chat_id, created_at FROM projects WHERE id = ?1",
            params![project_id],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    title: row.get(2)?,
                    chat_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(project)
}

pub fn project_members(conn: &Connection, project_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
    let mut stmt = conn.prepare("SELECT profile_id FROM project_members WHERE project_id = ?1")?;
    let members = stmt
        .query_map(params![project_id], |row| row.get::<_, Uuid>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(members)
}

fn add_project_member(
    conn: &Connection,
    project_id: Uuid,
    profile_id: Uuid,
) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO project_members (project_id, profile_id) VALUES (?1, ?2)",
        params![project_id, profile_id],
    )?;
    Ok(inserted > 0)
}

pub fn remove_project_member(
    conn: &Connection,
    project_id: Uuid,
    profile_id: Uuid,
) -> Result<bool, StoreError> {
    let deleted = conn.execute(
        "DELETE FROM project_members WHERE project_id = ?1 AND profile_id = ?2",
        params![project_id, profile_id],
    )?;
    Ok(deleted > 0)
}

/// Give the idea a project owned by its author with `member_id` in it.
///
/// An idea that already has a project keeps it; the member is added to the
/// existing membership, which is a no-op if they are already there.
pub fn create_or_extend_project(
    conn: &Connection,
    idea: &Idea,
    member_id: Uuid,
) -> Result<Provision, StoreError> {
    let existing = match idea.project_id {
        Some(project_id) => find_project(conn, project_id)?,
        None => None,
    };

    if let Some(project) = existing {
        let newly_added = add_project_member(conn, project.id, member_id)?;
        return Ok(Provision {
            id: project.id,
            created: false,
            newly_added,
        });
    }

    let project_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO projects (id, owner_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![project_id, idea.author_id, idea.title, Utc::now()],
    )?;
    add_project_member(conn, project_id, idea.author_id)?;
    add_project_member(conn, project_id, member_id)?;
    ideas::set_project(conn, idea.id, project_id)?;

    Ok(Provision {
        id: project_id,
        created: true,
        newly_added: true,
    })
}

/// Give the project a chat room holding its owner and `member_id`.
///
/// Mirrors `create_or_extend_project`: an existing room gains the member,
/// a missing one is created and linked to the project.
pub fn create_or_reuse_project_chat(
    conn: &Connection,
    project_id: Uuid,
    member_id: Uuid,
) -> Result<Provision, StoreError> {
    let project =
        find_project(conn, project_id)?.ok_or(StoreError::ProjectNotFound(project_id))?;

    let existing = match project.chat_id {
        Some(chat_id) => chats::find_chat(conn, chat_id)?,
        None => None,
    };

    if let Some(chat) = existing {
        let newly_added = chats::add_member(conn, chat.id, member_id)?;
        return Ok(Provision {
            id: chat.id,
            created: false,
            newly_added,
        });
    }

    let chat = chats::insert_chat(
        conn,
        &NewChat {
            owner_id: Some(project.owner_id),
            project_id: Some(project.id),
            ..NewChat::default()
        },
        &[project.owner_id, member_id],
    )?;
    conn.execute(
        "UPDATE projects SET chat_id = ?2 WHERE id = ?1",
        params![project.id, chat.id],
    )?;

    Ok(Provision {
        id: chat.id,
        created: true,
        newly_added: true,
    })
}

pub fn project_count(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        Database::prepare(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_first_collaborator_creates_project_and_chat() {
        let conn = conn();
        let author = Uuid::new_v4();
        let requester = Uuid::new_v4();
        let idea = ideas::insert_idea(&conn, author, "Solar kites").unwrap();

        let project = create_or_extend_project(&conn, &idea, requester).unwrap();
        assert!(project.created);
        assert_eq!(
            project_members(&conn, project.id).unwrap(),
            HashSet::from([author, requester])
        );
        assert_eq!(
            ideas::find_idea(&conn, idea.id).unwrap().unwrap().project_id,
            Some(project.id)
        );

        let chat = create_or_reuse_project_chat(&conn, project.id, requester).unwrap();
        assert!(chat.created);
        assert_eq!(
            chats::chat_members(&conn, chat.id).unwrap(),
            HashSet::from([author, requester])
        );
        assert_eq!(
            find_project(&conn, project.id).unwrap().unwrap().chat_id,
            Some(chat.id)
        );
    }

    #[test]
    fn test_second_collaborator_extends_existing_records() {
        let conn = conn();
        let author = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let idea = ideas::insert_idea(&conn, author, "Tide clock").unwrap();
        let project = create_or_extend_project(&conn, &idea, first).unwrap();
        let chat = create_or_reuse_project_chat(&conn, project.id, first).unwrap();

        let idea = ideas::find_idea(&conn, idea.id).unwrap().unwrap();
        let extended = create_or_extend_project(&conn, &idea, second).unwrap();
        let reused = create_or_reuse_project_chat(&conn, project.id, second).unwrap();

        assert_eq!(extended.id, project.id);
        assert!(!extended.created && extended.newly_added);
        assert_eq!(reused.id, chat.id);
        assert!(!reused.created && reused.newly_added);
        assert_eq!(project_count(&conn).unwrap(), 1);
        assert_eq!(chats::chat_members(&conn, chat.id).unwrap().len(), 3);

        let again = create_or_extend_project(&conn, &idea, second).unwrap();
        assert!(!again.newly_added);
        assert_eq!(project_members(&conn, project.id).unwrap().len(), 3);
    }
}
