//! Change notifications for connected clients.
//!
//! The engine only says "this game's combat data changed"; clients re-fetch.
//! Delivery is best-effort and never affects the outcome of an operation.

use crate::world::GameId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Resource families a notice can refer to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResourceKind {
    Combat,
}

/// One "resource changed" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub game_id: GameId,
    pub resource: ResourceKind,
}

/// Outbound notification channel.
///
/// Implementations must not block; the engine calls this while holding a
/// combat's serialization section.
pub trait Broadcaster: Send + Sync {
    fn notify_changed(&self, game_id: GameId, resource: ResourceKind);
}

/// Discards every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn notify_changed(&self, _game_id: GameId, _resource: ResourceKind) {}
}

/// Fans notices out over a tokio broadcast channel.
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<ChangeNotice>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn notify_changed(&self, game_id: GameId, resource: ResourceKind) {
        let notice = ChangeNotice { game_id, resource };
        if self.sender.send(notice).is_err() {
            // Nobody listening is normal
            tracing::trace!(game_id = %game_id, ?resource, "No subscribers for change notice");
        }
    }
}
