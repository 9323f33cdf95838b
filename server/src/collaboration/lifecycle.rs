//! Collaboration request decisions: `Pending -> {Approved, Rejected}`.
//!
//! The status write, the discard of a reserved chat and the project and chat
//! provisioning commit together. The requester's notification and the room's
//! `user_joined` announcement go out after commit and never fail a decision.

use std::sync::Arc;
use uuid::Uuid;

use crate::chat::ChatRooms;
use crate::db::models::{
    CollaborationStatus, NewNotification, NotificationKind, RelatedEntityType,
};
use crate::db::projects::{self, Provision};
use crate::db::{chats, collaboration, ideas, Database, StoreError};
use crate::error::ApiError;
use crate::notifications::Notifier;

/// Accepted feedback length, in characters.
pub const FEEDBACK_LENGTH: std::ops::RangeInclusive<usize> = 3..=255;

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("collaboration request {0} not found")]
    RequestNotFound(Uuid),
    #[error("only the idea's author can decide on its requests")]
    NotAuthor,
    #[error("collaboration request is already {0}")]
    NotPending(CollaborationStatus),
    #[error("a decision must approve or reject")]
    InvalidStatus,
    #[error("feedback must be 3 to 255 characters")]
    InvalidFeedback,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DecisionError> for ApiError {
    fn from(e: DecisionError) -> Self {
        match e {
            DecisionError::RequestNotFound(_) => ApiError::CollaborationRequestNotFound,
            DecisionError::NotAuthor => ApiError::UserNotAuthorized,
            DecisionError::NotPending(status) => ApiError::CollaborationRequestIsNotPending(status),
            DecisionError::InvalidStatus | DecisionError::InvalidFeedback => {
                ApiError::InvalidFeedback
            }
            DecisionError::Store(store) => ApiError::from(store),
        }
    }
}

/// What a committed decision changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decided {
    pub request_id: Uuid,
    pub requester_id: Uuid,
    pub idea_title: String,
    pub status: CollaborationStatus,
    /// Chat reserved for the request before the decision, now deleted.
    pub discarded_chat: Option<Uuid>,
    pub project: Option<Provision>,
    pub chat: Option<Provision>,
}

pub struct CollaborationLifecycle {
    db: Database,
    notifier: Notifier,
    chat: Arc<ChatRooms>,
}

impl CollaborationLifecycle {
    pub fn new(db: Database, notifier: Notifier, chat: Arc<ChatRooms>) -> Self {
        Self { db, notifier, chat }
    }

    /// Apply the idea author's decision on a pending request.
    ///
    /// Checks run in order: the request exists, the actor authored its idea,
    /// the request is still pending. A failed check leaves the request untouched.
    pub async fn decide(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        status: CollaborationStatus,
        feedback: &str,
    ) -> Result<Decided, DecisionError> {
        if status == CollaborationStatus::Pending {
            return Err(DecisionError::InvalidStatus);
        }
        let feedback = feedback.trim().to_string();
        if !FEEDBACK_LENGTH.contains(&feedback.chars().count()) {
            return Err(DecisionError::InvalidFeedback);
        }

        let decided = self
            .db
            .transaction(move |tx| {
                let request = collaboration::find_request(tx, request_id)?
                    .ok_or(DecisionError::RequestNotFound(request_id))?;
                let idea = ideas::find_idea(tx, request.idea_id)?
                    .ok_or(DecisionError::RequestNotFound(request_id))?;
                if idea.author_id != actor_id {
                    return Err(DecisionError::NotAuthor);
                }
                if request.status != CollaborationStatus::Pending {
                    return Err(DecisionError::NotPending(request.status));
                }

                if let Some(reserved) = request.chat_id {
                    chats::delete_chat(tx, reserved)?;
                }
                collaboration::set_decision(tx, request.id, status, &feedback)?;

                let (project, chat) = if status == CollaborationStatus::Approved {
                    let project = projects::create_or_extend_project(tx, &idea, request.requester_id)?;
                    let chat =
                        projects::create_or_reuse_project_chat(tx, project.id, request.requester_id)?;
                    (Some(project), Some(chat))
                } else {
                    (None, None)
                };

                Ok(Decided {
                    request_id: request.id,
                    requester_id: request.requester_id,
                    idea_title: idea.title,
                    status,
                    discarded_chat: request.chat_id,
                    project,
                    chat,
                })
            })
            .await?;

        tracing::info!(
            request_id = %decided.request_id,
            actor_id = %actor_id,
            status = %decided.status,
            project_id = ?decided.project.map(|p| p.id),
            chat_id = ?decided.chat.map(|c| c.id),
            "Collaboration request decided"
        );

        self.notify_requester(actor_id, &decided).await;

        if let Some(chat) = decided.chat {
            if !chat.created && chat.newly_added {
                self.chat.announce_join(chat.id, decided.requester_id).await;
            }
        }

        Ok(decided)
    }

    async fn notify_requester(&self, actor_id: Uuid, decided: &Decided) {
        let (kind, title, verb) = match decided.status {
            CollaborationStatus::Approved => (
                NotificationKind::CollaborationApproved,
                "Collaboration approved",
                "approved",
            ),
            _ => (
                NotificationKind::CollaborationRejected,
                "Collaboration rejected",
                "rejected",
            ),
        };
        let notification = NewNotification {
            user_profile_id: decided.requester_id,
            kind,
            title: title.to_string(),
            message: format!(
                "Your request to collaborate on \"{}\" was {verb}",
                decided.idea_title
            ),
            actor_profile_id: Some(actor_id),
            related_entity_id: Some(decided.request_id.to_string()),
            related_entity_type: Some(RelatedEntityType::CollaborationRequest),
        };
        if let Err(e) = self.notifier.create_and_send(notification).await {
            tracing::warn!(
                request_id = %decided.request_id,
                recipient_id = %decided.requester_id,
                error = %e,
                "Failed to notify requester"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Idea;
    use crate::db::notifications;
    use crate::db::store::RoomStore;
    use crate::realtime::{Frame, Realtime, RealtimeSettings, Session};
    use std::collections::HashSet;

    struct Fixture {
        db: Database,
        realtime: Realtime,
        lifecycle: CollaborationLifecycle,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let realtime = Realtime::new(RealtimeSettings::default());
        let store: Arc<dyn RoomStore> = Arc::new(db.clone());
        let chat = Arc::new(ChatRooms::new(store, realtime.chat.clone(), 8));
        let notifier = Notifier::new(db.clone(), realtime.notifications.clone());
        let lifecycle = CollaborationLifecycle::new(db.clone(), notifier, chat);
        Fixture {
            db,
            realtime,
            lifecycle,
        }
    }

    async fn seed(db: &Database, author: Uuid, requester: Uuid) -> (Idea, Uuid) {
        db.run(move |conn| {
            let idea = ideas::insert_idea(conn, author, "Rain harvester")?;
            let request = collaboration::insert_request(conn, idea.id, requester, "count me in")?;
            Ok::<_, StoreError>((idea, request.id))
        })
        .await
        .unwrap()
    }

    async fn request_for(db: &Database, idea_id: Uuid, requester: Uuid) -> Uuid {
        db.run(move |conn| collaboration::insert_request(conn, idea_id, requester, "me too"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_approval_provisions_project_and_chat() {
        let f = fixture();
        let (author, requester) = (Uuid::new_v4(), Uuid::new_v4());
        let (idea, request_id) = seed(&f.db, author, requester).await;

        let decided = f
            .lifecycle
            .decide(author, request_id, CollaborationStatus::Approved, "welcome aboard")
            .await
            .unwrap();

        let project = decided.project.unwrap();
        let chat = decided.chat.unwrap();
        assert!(project.created && chat.created);

        let (stored, members, idea_after) = f
            .db
            .run(move |conn| {
                Ok::<_, StoreError>((
                    collaboration::find_request(conn, request_id)?,
                    chats::chat_members(conn, chat.id)?,
                    ideas::find_idea(conn, idea.id)?,
                ))
            })
            .await
            .unwrap();
        let stored = stored.unwrap();
        assert_eq!(stored.status, CollaborationStatus::Approved);
        assert_eq!(stored.feedback.as_deref(), Some("welcome aboard"));
        assert_eq!(members, HashSet::from([author, requester]));
        assert_eq!(idea_after.unwrap().project_id, Some(project.id));
    }

    #[tokio::test]
    async fn test_second_approval_fails_fast() {
        let f = fixture();
        let (author, requester) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, request_id) = seed(&f.db, author, requester).await;

        let decided = f
            .lifecycle
            .decide(author, request_id, CollaborationStatus::Approved, "yes")
            .await
            .unwrap();
        let project_id = decided.project.unwrap().id;
        let chat_id = decided.chat.unwrap().id;

        let snapshot = move |conn: &mut rusqlite::Connection| {
            Ok::<_, StoreError>((
                projects::project_members(conn, project_id)?,
                chats::chat_members(conn, chat_id)?,
                projects::project_count(conn)?,
                chats::chat_count(conn)?,
                notifications::list_page(conn, requester, 0, 100)?.1,
                collaboration::find_request(conn, request_id)?,
            ))
        };
        let before = f.db.run(snapshot).await.unwrap();
        assert_eq!(before.0, HashSet::from([author, requester]));
        assert_eq!(before.1, HashSet::from([author, requester]));
        assert_eq!((before.2, before.3, before.4), (1, 1, 1));

        let again = f
            .lifecycle
            .decide(author, request_id, CollaborationStatus::Approved, "yes again")
            .await;
        assert!(matches!(
            again,
            Err(DecisionError::NotPending(CollaborationStatus::Approved))
        ));

        let after = f.db.run(snapshot).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.5.unwrap().feedback.as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_non_author_leaves_request_untouched() {
        let f = fixture();
        let (author, requester) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, request_id) = seed(&f.db, author, requester).await;

        let result = f
            .lifecycle
            .decide(requester, request_id, CollaborationStatus::Approved, "approve myself")
            .await;
        assert!(matches!(result, Err(DecisionError::NotAuthor)));

        let stored = f
            .db
            .run(move |conn| collaboration::find_request(conn, request_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CollaborationStatus::Pending);
        assert!(stored.feedback.is_none());
    }

    #[tokio::test]
    async fn test_rejection_discards_reserved_chat_and_notifies() {
        let f = fixture();
        let (author, requester) = (Uuid::new_v4(), Uuid::new_v4());
        let (idea, request_id) = seed(&f.db, author, requester).await;

        let reserved = f
            .db
            .run(move |conn| {
                let chat = chats::insert_chat(
                    conn,
                    &chats::NewChat {
                        owner_id: Some(author),
                        idea_id: Some(idea.id),
                        collaboration_request_id: Some(request_id),
                        project_id: None,
                    },
                    &[author, requester],
                )?;
                collaboration::set_chat(conn, request_id, Some(chat.id))?;
                Ok::<_, StoreError>(chat.id)
            })
            .await
            .unwrap();

        let (session, mut rx) = Session::channel(requester, None, 4);
        f.realtime.notifications.registry().add(session);

        let decided = f
            .lifecycle
            .decide(author, request_id, CollaborationStatus::Rejected, "not this time")
            .await
            .unwrap();
        assert_eq!(decided.discarded_chat, Some(reserved));
        assert!(decided.project.is_none() && decided.chat.is_none());

        let (chat, unread) = f
            .db
            .run(move |conn| {
                Ok::<_, StoreError>((
                    chats::find_chat(conn, reserved)?,
                    notifications::unread_count(conn, requester)?,
                ))
            })
            .await
            .unwrap();
        assert!(chat.is_none());
        assert_eq!(unread, 1);

        match rx.try_recv() {
            Ok(Frame::Event(event)) => {
                assert_eq!(event.data["notification"]["type"], "CollaborationRejected");
                assert_eq!(
                    event.data["notification"]["relatedEntityId"],
                    request_id.to_string()
                );
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approval_extends_existing_room_and_announces() {
        let f = fixture();
        let (author, first, second) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (idea, first_request) = seed(&f.db, author, first).await;
        let initial = f
            .lifecycle
            .decide(author, first_request, CollaborationStatus::Approved, "first in")
            .await
            .unwrap();
        let room = initial.chat.unwrap().id;

        let (session, mut rx) = Session::channel(author, Some(room), 4);
        f.realtime.chat.registry().add(session);

        let second_request = request_for(&f.db, idea.id, second).await;
        let decided = f
            .lifecycle
            .decide(author, second_request, CollaborationStatus::Approved, "second in")
            .await
            .unwrap();

        let project = decided.project.unwrap();
        let chat = decided.chat.unwrap();
        assert_eq!(project.id, initial.project.unwrap().id);
        assert!(!project.created && project.newly_added);
        assert_eq!(chat.id, room);
        assert!(!chat.created && chat.newly_added);

        match rx.try_recv() {
            Ok(Frame::Event(event)) => {
                assert_eq!(event.name, crate::chat::protocol::USER_JOINED);
                assert_eq!(event.data["userProfileId"], second.to_string());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_feedback_length_checked_before_storage() {
        let f = fixture();
        let result = f
            .lifecycle
            .decide(Uuid::new_v4(), Uuid::new_v4(), CollaborationStatus::Approved, "ok")
            .await;
        assert!(matches!(result, Err(DecisionError::InvalidFeedback)));

        let result = f
            .lifecycle
            .decide(Uuid::new_v4(), Uuid::new_v4(), CollaborationStatus::Pending, "long enough")
            .await;
        assert!(matches!(result, Err(DecisionError::InvalidStatus)));
    }
}
