//! Row types for the storage collaborator.
//! These correspond to the SQLite schema defined in migrations.rs.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Implements string conversions plus rusqlite TEXT mapping for a unit enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollaborationStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(CollaborationStatus {
    Pending => "Pending",
    Approved => "Approved",
    Rejected => "Rejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Invite,
    Comment,
    Like,
    Follow,
    CollaborationApproved,
    CollaborationRejected,
}

text_enum!(NotificationKind {
    Invite => "Invite",
    Comment => "Comment",
    Like => "Like",
    Follow => "Follow",
    CollaborationApproved => "CollaborationApproved",
    CollaborationRejected => "CollaborationRejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelatedEntityType {
    CollaborationRequest,
    Idea,
    Comment,
    Project,
}

text_enum!(RelatedEntityType {
    CollaborationRequest => "COLLABORATION_REQUEST",
    Idea => "IDEA",
    Comment => "COMMENT",
    Project => "PROJECT",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    /// The idea's current project, if one has been provisioned.
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationRequest {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub requester_id: Uuid,
    /// Chat reserved for this request while it is pending.
    pub chat_id: Option<Uuid>,
    pub status: CollaborationStatus,
    pub feedback: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub chat_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub idea_id: Option<Uuid>,
    pub collaboration_request_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_profile_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read_at: Option<DateTime<Utc>>,
    pub actor_profile_id: Option<Uuid>,
    pub related_entity_id: Option<String>,
    pub related_entity_type: Option<RelatedEntityType>,
    pub created_at: DateTime<Utc>,
}

/// Notification fields supplied by a producer.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_profile_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub actor_profile_id: Option<Uuid>,
    pub related_entity_id: Option<String>,
    pub related_entity_type: Option<RelatedEntityType>,
}
