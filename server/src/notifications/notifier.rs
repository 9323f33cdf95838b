use std::sync::Arc;

use serde_json::json;

use crate::db::models::{NewNotification, Notification};
use crate::db::{notifications, Database, StoreError};
use crate::realtime::{Dispatcher, Event};

pub const NEW_NOTIFICATION: &str = "new_notification";

/// Persists notifications and pushes them to the recipient's live streams.
#[derive(Debug, Clone)]
pub struct Notifier {
    db: Database,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(db: Database, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Store the notification, then deliver it to whichever streams are open.
    /// Only the store can fail; an offline recipient reads it later from the list.
    pub async fn create_and_send(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let notification = self
            .db
            .run(move |conn| notifications::insert_notification(conn, new))
            .await?;
        self.push(&notification).await;
        Ok(notification)
    }

    /// Deliver an already stored notification. Returns the live session count reached.
    pub async fn push(&self, notification: &Notification) -> usize {
        let event = Arc::new(Event::new(
            NEW_NOTIFICATION,
            json!({ "notification": notification }),
        ));
        let delivered = self
            .dispatcher
            .send(notification.user_profile_id, event)
            .await;
        tracing::info!(
            recipient_id = %notification.user_profile_id,
            notification_id = %notification.id,
            delivered = delivered,
            "Notification sent"
        );
        delivered
    }
}
