//! Chat rooms, their membership and their transcripts.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use uuid::Uuid;

use super::models::{Chat, ChatMessage};
use super::StoreError;

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        idea_id: row.get(2)?,
        collaboration_request_id: row.get(3)?,
        project_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn find_chat(conn: &Connection, chat_id: Uuid) -> Result<Option<Chat>, StoreError> {
    let chat = conn
        .query_row(
            "SELECT id, owner_id, idea_id, collaboration_request_id, project_id, created_at
             FROM chats WHERE id = ?1",
            params![chat_id],
            chat_from_row,
        )
        .optional()?;
    Ok(chat)
}

/// Current member set of a room. Fails with `ChatNotFound` for an unknown room.
pub fn chat_members(conn: &Connection, chat_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chats WHERE id = ?1)",
        params![chat_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::ChatNotFound(chat_id));
    }

    let mut stmt = conn.prepare("SELECT profile_id FROM chat_members WHERE chat_id = ?1")?;
    let members = stmt
        .query_map(params![chat_id], |row| row.get::<_, Uuid>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(members)
}

const VISIBLE_TO: &str = "owner_id = ?1 OR id IN (SELECT chat_id FROM chat_members WHERE profile_id = ?1)";

/// One page of the rooms a profile owns or belongs to, newest first, plus the
/// total across all pages.
pub fn chats_for(
    conn: &Connection,
    profile_id: Uuid,
    page: u32,
    quantity: u32,
) -> Result<(Vec<Chat>, i64), StoreError> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM chats WHERE {VISIBLE_TO}"),
        params![profile_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT id, owner_id, idea_id, collaboration_request_id, project_id, created_at
         FROM chats WHERE {VISIBLE_TO}
         ORDER BY created_at DESC, id ASC LIMIT ?2 OFFSET ?3"
    ))?;
    let offset = i64::from(page) * i64::from(quantity);
    let chats = stmt
        .query_map(params![profile_id, quantity, offset], chat_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((chats, total))
}

pub fn chat_count(conn: &Connection) -> Result<i64, StoreError> {
    let count = conn.query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?;
    Ok(count)
}

/// Fields for a new room.
#[derive(Debug, Clone, Default)]
pub struct NewChat {
    pub owner_id: Option<Uuid>,
    pub idea_id: Option<Uuid>,
    pub collaboration_request_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// Create a room holding exactly `members`.
pub fn insert_chat(
    conn: &Connection,
    chat: &NewChat,
    members: &[Uuid],
) -> Result<Chat, StoreError> {
    let created = Chat {
        id: Uuid::new_v4(),
        owner_id: chat.owner_id,
        idea_id: chat.idea_id,
        collaboration_request_id: chat.collaboration_request_id,
        project_id: chat.project_id,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO chats (id, owner_id, idea_id, collaboration_request_id, project_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            created.id,
            created.owner_id,
            created.idea_id,
            created.collaboration_request_id,
            created.project_id,
            created.created_at,
        ],
    )?;
    for member in members {
        add_member(conn, created.id, *member)?;
    }
    Ok(created)
}

/// Add a member. Returns `false` if they already belonged to the room.
pub fn add_member(conn: &Connection, chat_id: Uuid, profile_id: Uuid) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO chat_members (chat_id, profile_id) VALUES (?1, ?2)",
        params![chat_id, profile_id],
    )?;
    Ok(inserted > 0)
}

pub fn remove_member(
    conn: &Connection,
    chat_id: Uuid,
    profile_id: Uuid,
) -> Result<bool, StoreError> {
    let deleted = conn.execute(
        "DELETE FROM chat_members WHERE chat_id = ?1 AND profile_id = ?2",
        params![chat_id, profile_id],
    )?;
    Ok(deleted > 0)
}

/// Delete a room along with its membership and transcript.
pub fn delete_chat(conn: &Connection, chat_id: Uuid) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
    Ok(deleted > 0)
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Append a message to a room's transcript.
///
/// The timestamp is the later of now and the room's newest message, so it
/// never goes backwards within a room even if the wall clock does.
pub fn append_message(
    conn: &Connection,
    chat_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> Result<ChatMessage, StoreError> {
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(timestamp_ms) FROM messages WHERE chat_id = ?1",
        params![chat_id],
        |row| row.get(0),
    )?;
    let now = Utc::now().timestamp_millis();
    let timestamp_ms = last.map_or(now, |last| last.max(now));

    conn.execute(
        "INSERT INTO messages (chat_id, sender_id, content, timestamp_ms) VALUES (?1, ?2, ?3, ?4)",
        params![chat_id, sender_id, content, timestamp_ms],
    )?;

    Ok(ChatMessage {
        sender_id,
        content: content.to_string(),
        timestamp: millis_to_datetime(timestamp_ms),
    })
}

/// Full transcript of a room, oldest first.
pub fn transcript(conn: &Connection, chat_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT sender_id, content, timestamp_ms FROM messages WHERE chat_id = ?1 ORDER BY id ASC",
    )?;
    let messages = stmt
        .query_map(params![chat_id], |row| {
            Ok(ChatMessage {
                sender_id: row.get(0)?,
                content: row.get(1)?,
                timestamp: millis_to_datetime(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

pub fn message_count(conn: &Connection, chat_id: Uuid) -> Result<i64, StoreError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
        params![chat_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
