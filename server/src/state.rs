use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::chat::ChatRooms;
use crate::collaboration::CollaborationLifecycle;
use crate::db::store::RoomStore;
use crate::db::Database;
use crate::notifications::Notifier;
use crate::realtime::{Realtime, RealtimeSettings};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: Database,
    /// HS256 verifier for bearer and handshake tokens
    pub verifier: Arc<TokenVerifier>,
    /// Chat and notification registries plus the liveness monitor
    pub realtime: Arc<Realtime>,
    pub chat: Arc<ChatRooms>,
    pub notifier: Notifier,
    pub collaboration: Arc<CollaborationLifecycle>,
}

impl AppState {
    /// Wire the delivery core and its producers around one database.
    pub fn new(db: Database, verifier: TokenVerifier, settings: RealtimeSettings) -> Self {
        let realtime = Arc::new(Realtime::new(settings));
        let store: Arc<dyn RoomStore> = Arc::new(db.clone());
        let chat = Arc::new(ChatRooms::new(
            store,
            realtime.chat.clone(),
            settings.session_buffer,
        ));
        let notifier = Notifier::new(db.clone(), realtime.notifications.clone());
        let collaboration = Arc::new(CollaborationLifecycle::new(
            db.clone(),
            notifier.clone(),
            chat.clone(),
        ));
        Self {
            db,
            verifier: Arc::new(verifier),
            realtime,
            chat,
            notifier,
            collaboration,
        }
    }
}
