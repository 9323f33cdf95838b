use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::models::{CollaborationRequest, CollaborationStatus};
use super::StoreError;

const COLUMNS: &str =
    "id, idea_id, requester_id, chat_id, status, feedback, message, created_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<CollaborationRequest> {
    Ok(CollaborationRequest {
        id: row.get(0)?,
        idea_id: row.get(1)?,
        requester_id: row.get(2)?,
        chat_id: row.get(3)?,
        status: row.get(4)?,
        feedback: row.get(5)?,
        message: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn insert_request(
    conn: &Connection,
    idea_id: Uuid,
    requester_id: Uuid,
    message: &str,
) -> Result<CollaborationRequest, StoreError> {
    let request = CollaborationRequest {
        id: Uuid::new_v4(),
        idea_id,
        requester_id,
        chat_id: None,
        status: CollaborationStatus::Pending,
        feedback: None,
        message: message.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO collaboration_requests (id, idea_id, requester_id, status, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            request.id,
            request.idea_id,
            request.requester_id,
            request.status,
            request.message,
            request.created_at,
        ],
    )?;
    Ok(request)
}

pub fn find_request(
    conn: &Connection,
    request_id: Uuid,
) -> Result<Option<CollaborationRequest>, StoreError> {
    let request = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM collaboration_requests WHERE id = ?1"),
            params![request_id],
            request_from_row,
        )
        .optional()?;
    Ok(request)
}

/// The requester's pending request for an idea, if any.
pub fn find_pending(
    conn: &Connection,
    idea_id: Uuid,
    requester_id: Uuid,
) -> Result<Option<CollaborationRequest>, StoreError> {
    let request = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM collaboration_requests
                 WHERE idea_id = ?1 AND requester_id = ?2 AND status = ?3
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![idea_id, requester_id, CollaborationStatus::Pending],
            request_from_row,
        )
        .optional()?;
    Ok(request)
}

pub fn set_chat(
    conn: &Connection,
    request_id: Uuid,
    chat_id: Option<Uuid>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE collaboration_requests SET chat_id = ?2 WHERE id = ?1",
        params![request_id, chat_id],
    )?;
    Ok(())
}

/// Record the author's decision. The reserved chat reference is cleared.
pub fn set_decision(
    conn: &Connection,
    request_id: Uuid,
    status: CollaborationStatus,
    feedback: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE collaboration_requests SET status = ?2, feedback = ?3, chat_id = NULL WHERE id = ?1",
        params![request_id, status, feedback],
    )?;
    Ok(())
}
