//! Broadcast Hub (C9): emission primitives filtered through the
//! Context/Subscription table (C6), grounded on the quiz-app `ServerState`'s
//! per-session `mpsc::UnboundedSender` fan-out and the jet_raiders lobby
//! registry's broadcast-channel shape.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    context::is_delivery_allowed,
    sessions::{ConnectionId, SessionRegistry},
    transport::messages::ServerMessage,
};

#[derive(Clone)]
pub struct BroadcastHub {
    sessions: SessionRegistry,
    global_countdown_throttle: Arc<Mutex<Option<Instant>>>,
}

impl BroadcastHub {
    #[must_use]
    pub fn new(sessions: SessionRegistry) -> Self {
        Self {
            sessions,
            global_countdown_throttle: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends directly to one connection, bypassing subscription filtering.
    /// Silently drops if the connection is gone.
    pub async fn emit_to(&self, connection_id: &ConnectionId, message: ServerMessage) {
        if let Some(sender) = self.sessions.sender_of(connection_id).await {
            let _ = sender.send(message);
        }
    }

    /// Emits to every connected session whose current context permits
    /// `message`'s event, honoring the guest hard-block.
    pub async fn broadcast(&self, message: ServerMessage) {
        let event = message.event_name();
        for session in self.sessions.all_sessions().await {
            let Some(ctx) = session.current_context else {
                continue;
            };
            if !is_delivery_allowed(&ctx, session.is_authenticated, event) {
                continue;
            }
            if let Some(sender) = session.sender {
                let _ = sender.send(message.clone());
            }
        }
    }

    /// `eventCountdown` (and similarly throttled events): honors both a
    /// per-client and a global throttle window, as required by §4.5/§4.7.
    pub async fn broadcast_throttled(
        &self,
        message: ServerMessage,
        per_client_window: Duration,
    ) {
        {
            let mut global = self.global_countdown_throttle.lock().await;
            let now = Instant::now();
            let allowed = global.map_or(true, |last| now.duration_since(last) >= per_client_window);
            if !allowed {
                return;
            }
            *global = Some(now);
        }
        let event = message.event_name();
        for session in self.sessions.all_sessions().await {
            let Some(ctx) = session.current_context else {
                continue;
            };
            if !is_delivery_allowed(&ctx, session.is_authenticated, event) {
                continue;
            }
            if !self
                .sessions
                .try_throttle_countdown(&session.connection_id, per_client_window)
                .await
            {
                continue;
            }
            if let Some(sender) = session.sender {
                let _ = sender.send(message.clone());
            }
        }
        debug!(?event, "broadcast throttled emit");
    }
}
