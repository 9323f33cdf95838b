use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, ToSql};
use uuid::Uuid;

use super::models::{NewNotification, Notification};
use super::StoreError;

pub fn insert_notification(
    conn: &Connection,
    new: NewNotification,
) -> Result<Notification, StoreError> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_profile_id: new.user_profile_id,
        kind: new.kind,
        title: new.title,
        message: new.message,
        read_at: None,
        actor_profile_id: new.actor_profile_id,
        related_entity_id: new.related_entity_id,
        related_entity_type: new.related_entity_type,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO notifications (id, user_profile_id, kind, title, message, read_at,
             actor_profile_id, related_entity_id, related_entity_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9)",
        params![
            notification.id,
            notification.user_profile_id,
            notification.kind,
            notification.title,
            notification.message,
            notification.actor_profile_id,
            notification.related_entity_id,
            notification.related_entity_type,
            notification.created_at,
        ],
    )?;
    Ok(notification)
}

/// One page of a user's notifications, newest first, plus the total count.
pub fn list_page(
    conn: &Connection,
    user_profile_id: Uuid,
    page: u32,
    quantity: u32,
) -> Result<(Vec<Notification>, i64), StoreError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_profile_id = ?1",
        params![user_profile_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, user_profile_id, kind, title, message, read_at, actor_profile_id,
                related_entity_id, related_entity_type, created_at
         FROM notifications WHERE user_profile_id = ?1
         ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
    )?;
    let offset = i64::from(page) * i64::from(quantity);
    let notifications = stmt
        .query_map(params![user_profile_id, quantity, offset], |row| {
            Ok(Notification {
                id: row.get(0)?,
                user_profile_id: row.get(1)?,
                kind: row.get(2)?,
                title: row.get(3)?,
                message: row.get(4)?,
                read_at: row.get(5)?,
                actor_profile_id: row.get(6)?,
                related_entity_id: row.get(7)?,
                related_entity_type: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((notifications, total))
}

pub fn unread_count(conn: &Connection, user_profile_id: Uuid) -> Result<i64, StoreError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_profile_id = ?1 AND read_at IS NULL",
        params![user_profile_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Mark unread notifications as read. An empty id list means all of them.
pub fn mark_read(
    conn: &Connection,
    user_profile_id: Uuid,
    ids: &[Uuid],
) -> Result<usize, StoreError> {
    let now = Utc::now();
    if ids.is_empty() {
        let updated = conn.execute(
            "UPDATE notifications SET read_at = ?2 WHERE user_profile_id = ?1 AND read_at IS NULL",
            params![user_profile_id, now],
        )?;
        return Ok(updated);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE notifications SET read_at = ?1
         WHERE user_profile_id = ?2 AND read_at IS NULL AND id IN ({placeholders})"
    );
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now), Box::new(user_profile_id)];
    values.extend(ids.iter().map(|id| Box::new(*id) as Box<dyn ToSql>));
    let updated = conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(updated)
}

pub fn delete_all(conn: &Connection, user_profile_id: Uuid) -> Result<usize, StoreError> {
    let deleted = conn.execute(
        "DELETE FROM notifications WHERE user_profile_id = ?1",
        params![user_profile_id],
    )?;
    Ok(deleted)
}
