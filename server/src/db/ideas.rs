use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::models::Idea;
use super::StoreError;

pub fn insert_idea(conn: &Connection, author_id: Uuid, title: &str) -> Result<Idea, StoreError> {
    let idea = Idea {
        id: Uuid::new_v4(),
        author_id,
        title: title.to_string(),
        project_id: None,
    };
    conn.execute(
        "INSERT INTO ideas (id, author_id, title, project_id, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
        params![idea.id, idea.author_id, idea.title, Utc::now()],
    )?;
    Ok(idea)
}

pub fn find_idea(conn: &Connection, idea_id: Uuid) -> Result<Option<Idea>, StoreError> {
    let idea = conn
        .query_row(
            "SELECT id, author_id, title, project_id FROM ideas WHERE id = ?1",
            params![idea_id],
            |row| {
                Ok(Idea {
                    id: row.get(0)?,
                    author_id: row.get(1)?,
                    title: row.get(2)?,
                    project_id: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(idea)
}

pub fn set_project(conn: &Connection, idea_id: Uuid, project_id: Uuid) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ideas SET project_id = ?2 WHERE id = ?1",
        params![idea_id, project_id],
    )?;
    Ok(())
}
