use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::{chatdb::ChatExt, db::DBClient};
use crate::models::{
    chatmodel::{ChatMessage, MessageType, TypingSignal},
    usermodel::UserRole,
};

const CHANNEL_CAPACITY: usize = 64;

/// Everything that flows on a complaint's realtime channel: durable insert
/// notifications (emitted after the row commits) and ephemeral typing
/// broadcasts (never persisted).
#[derive(Debug, Clone)]
pub enum ChatEvent {
    MessageInserted(ChatMessage),
    Typing(TypingSignal),
}

/// One broadcast channel per complaint id, created lazily on first
/// subscribe and dropped once nobody is listening.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<ChatEvent>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry::default()
    }

    pub fn subscribe(&self, complaint_id: Uuid) -> broadcast::Receiver<ChatEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(complaint_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, complaint_id: Uuid, event: ChatEvent) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(tx) = channels.get(&complaint_id) {
            if tx.send(event).is_err() {
                channels.remove(&complaint_id);
            }
        }
    }
}

/// Durable chat operations plus the store-side change notification: inserts
/// go to Postgres first, then fan out to channel subscribers. Senders never
/// push message payloads to peers directly, so nothing is double-delivered.
#[derive(Debug)]
pub struct ChatService {
    db: Arc<DBClient>,
    registry: ChannelRegistry,
}

impl ChatService {
    pub fn new(db: Arc<DBClient>) -> Self {
        ChatService {
            db,
            registry: ChannelRegistry::new(),
        }
    }

    pub fn subscribe(&self, complaint_id: Uuid) -> broadcast::Receiver<ChatEvent> {
        self.registry.subscribe(complaint_id)
    }

    pub async fn history(&self, complaint_id: Uuid) -> Result<Vec<ChatMessage>, sqlx::Error> {
        self.db.get_messages(complaint_id).await
    }

    pub async fn send_message(
        &self,
        complaint_id: Uuid,
        sender_id: Uuid,
        sender_role: UserRole,
        content: String,
    ) -> Result<ChatMessage, sqlx::Error> {
        let message = self
            .db
            .insert_message(complaint_id, sender_id, sender_role, MessageType::Text, content)
            .await?;

        self.registry
            .publish(complaint_id, ChatEvent::MessageInserted(message.clone()));

        Ok(message)
    }

    pub fn broadcast_typing(&self, complaint_id: Uuid, signal: TypingSignal) {
        self.registry.publish(complaint_id, ChatEvent::Typing(signal));
    }

    pub async fn mark_read(
        &self,
        complaint_id: Uuid,
        reader_role: UserRole,
    ) -> Result<u64, sqlx::Error> {
        self.db.mark_messages_read(complaint_id, reader_role).await
    }

    pub async fn unread_count(
        &self,
        complaint_id: Uuid,
        reader_role: UserRole,
    ) -> Result<i64, sqlx::Error> {
        self.db.unread_message_count(complaint_id, reader_role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: Uuid, is_typing: bool) -> ChatEvent {
        ChatEvent::Typing(TypingSignal {
            user_id,
            role: UserRole::Student,
            name: "Test Student".to_string(),
            is_typing,
        })
    }

    #[tokio::test]
    async fn delivers_events_in_publish_order() {
        let registry = ChannelRegistry::new();
        let complaint_id = Uuid::new_v4();
        let mut rx = registry.subscribe(complaint_id);

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        registry.publish(complaint_id, typing(first, true));
        registry.publish(complaint_id, typing(second, false));

        match rx.recv().await.unwrap() {
            ChatEvent::Typing(sig) => assert_eq!(sig.user_id, first),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ChatEvent::Typing(sig) => assert_eq!(sig.user_id, second),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn all_subscribers_receive_each_event() {
        let registry = ChannelRegistry::new();
        let complaint_id = Uuid::new_v4();
        let mut student_rx = registry.subscribe(complaint_id);
        let mut admin_rx = registry.subscribe(complaint_id);

        let user_id = Uuid::new_v4();
        registry.publish(complaint_id, typing(user_id, true));

        assert!(matches!(
            student_rx.recv().await.unwrap(),
            ChatEvent::Typing(sig) if sig.user_id == user_id
        ));
        assert!(matches!(
            admin_rx.recv().await.unwrap(),
            ChatEvent::Typing(sig) if sig.user_id == user_id
        ));
    }

    #[tokio::test]
    async fn channels_are_isolated_per_complaint() {
        let registry = ChannelRegistry::new();
        let complaint_a = Uuid::new_v4();
        let complaint_b = Uuid::new_v4();
        let mut rx_b = registry.subscribe(complaint_b);

        registry.publish(complaint_a, typing(Uuid::new_v4(), true));

        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let registry = ChannelRegistry::new();
        // Never subscribed; nothing to deliver and nothing to panic about.
        registry.publish(Uuid::new_v4(), typing(Uuid::new_v4(), true));
    }
}
