use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{
    chatmodel::{ChatMessage, TypingSignal, TypingUser},
    usermodel::UserRole,
};
use crate::service::realtime::{ChatEvent, ChatService};

/// A remote typing claim goes stale this long after its latest refresh.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);
/// Local typing auto-clears after this much keyboard silence.
pub const TYPING_IDLE_TIMEOUT: Duration = Duration::from_secs(2);
/// Foreign inserts are marked read after this short delay.
pub const MARK_READ_DELAY: Duration = Duration::from_millis(500);

/// The caller's identity, handed in explicitly instead of read from any
/// ambient auth context.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: Uuid,
    pub role: UserRole,
    pub display_name: String,
}

/// Single "who is typing" slot. The conversation is strictly two-party, so
/// one slot with last-write-wins is enough; a group channel would need a
/// per-user expiry map instead.
#[derive(Debug, Default)]
pub struct TypingSlot {
    current: Option<TypingUser>,
    expires_at: Option<Instant>,
}

impl TypingSlot {
    pub fn observe(&mut self, signal: &TypingSignal, self_user_id: Uuid, now: Instant) {
        if signal.user_id == self_user_id {
            return;
        }
        if signal.is_typing {
            self.current = Some(TypingUser {
                user_id: signal.user_id,
                role: signal.role,
                name: signal.name.clone(),
            });
            self.expires_at = Some(now + TYPING_EXPIRY);
        } else {
            self.clear();
        }
    }

    pub fn current(&mut self, now: Instant) -> Option<&TypingUser> {
        if let Some(deadline) = self.expires_at {
            if now >= deadline {
                self.clear();
            }
        }
        self.current.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.expires_at
    }

    fn clear(&mut self) {
        self.current = None;
        self.expires_at = None;
    }
}

/// Flip the reader's flag on every message authored by the opposite role.
/// Flags only ever move false -> true.
pub fn apply_read_receipts(messages: &mut [ChatMessage], reader_role: UserRole) {
    for message in messages.iter_mut() {
        if message.sender_role == reader_role {
            continue;
        }
        match reader_role {
            UserRole::Student => message.read_by_student = true,
            UserRole::Admin => message.read_by_admin = true,
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    /// A new message landed; `from_other_party` tells the caller whether a
    /// delayed mark-read should be scheduled.
    Appended {
        message: ChatMessage,
        from_other_party: bool,
    },
    TypingChanged,
    Ignored,
}

/// One party's live session on a complaint's conversation. Holds the
/// message history, the typing slot, and the channel subscription; tears
/// everything down on drop.
pub struct ConversationChannel {
    complaint_id: Uuid,
    participant: Participant,
    chat: Arc<ChatService>,
    events: broadcast::Receiver<ChatEvent>,
    messages: Vec<ChatMessage>,
    typing: TypingSlot,
}

impl ConversationChannel {
    /// Subscribe first, then load history, then flip the other party's
    /// existing messages to read. Subscribing before the fetch means no
    /// insert can fall between the snapshot and the live feed.
    pub async fn open(
        chat: Arc<ChatService>,
        complaint_id: Uuid,
        participant: Participant,
    ) -> Result<Self, sqlx::Error> {
        let events = chat.subscribe(complaint_id);
        let mut messages = chat.history(complaint_id).await?;
        chat.mark_read(complaint_id, participant.role).await?;
        apply_read_receipts(&mut messages, participant.role);

        Ok(ConversationChannel {
            complaint_id,
            participant,
            chat,
            events,
            messages,
            typing: TypingSlot::default(),
        })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn typing_user(&mut self) -> Option<TypingUser> {
        self.typing.current(Instant::now()).cloned()
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Persist a message. Whitespace-only content is a silent no-op. The
    /// message is not appended locally; it arrives through the channel echo
    /// like everyone else's, so a failed send leaves no artifact.
    pub async fn send(&self, content: &str) -> Result<Option<ChatMessage>, sqlx::Error> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let message = self
            .chat
            .send_message(
                self.complaint_id,
                self.participant.user_id,
                self.participant.role,
                content.to_string(),
            )
            .await?;

        // Sending implies typing has ended
        self.set_typing(false);

        Ok(Some(message))
    }

    pub fn set_typing(&self, is_typing: bool) {
        self.chat.broadcast_typing(
            self.complaint_id,
            TypingSignal {
                user_id: self.participant.user_id,
                role: self.participant.role,
                name: self.participant.display_name.clone(),
                is_typing,
            },
        );
    }

    /// Next channel event, or `None` once the channel is gone. A lagged
    /// subscription resyncs with a full history refetch rather than
    /// guessing at what was missed.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "chat channel for complaint {} lagged by {} events, resyncing",
                        self.complaint_id,
                        skipped
                    );
                    if let Err(e) = self.resync().await {
                        tracing::error!("chat resync failed: {}", e);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn resync(&mut self) -> Result<(), sqlx::Error> {
        self.messages = self.chat.history(self.complaint_id).await?;
        Ok(())
    }

    pub fn apply_event(&mut self, event: ChatEvent, now: Instant) -> EventOutcome {
        match event {
            ChatEvent::MessageInserted(message) => {
                let from_other_party = message.sender_id != self.participant.user_id;
                self.messages.push(message.clone());
                EventOutcome::Appended {
                    message,
                    from_other_party,
                }
            }
            ChatEvent::Typing(signal) => {
                if signal.user_id == self.participant.user_id {
                    return EventOutcome::Ignored;
                }
                self.typing.observe(&signal, self.participant.user_id, now);
                EventOutcome::TypingChanged
            }
        }
    }

    /// Idempotent: already-read messages are untouched.
    pub async fn mark_read(&mut self) -> Result<(), sqlx::Error> {
        self.chat
            .mark_read(self.complaint_id, self.participant.role)
            .await?;
        apply_read_receipts(&mut self.messages, self.participant.role);
        Ok(())
    }

    /// Tear down the subscription and any pending typing state.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chatmodel::MessageType;
    use chrono::Utc;

    fn signal(user_id: Uuid, role: UserRole, is_typing: bool) -> TypingSignal {
        TypingSignal {
            user_id,
            role,
            name: "Someone".to_string(),
            is_typing,
        }
    }

    fn message(sender_role: UserRole) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            complaint_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_role,
            content: "hello".to_string(),
            message_type: MessageType::Text,
            read_by_student: sender_role == UserRole::Student,
            read_by_admin: sender_role == UserRole::Admin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn typing_slot_ignores_self() {
        let me = Uuid::new_v4();
        let mut slot = TypingSlot::default();
        let now = Instant::now();

        slot.observe(&signal(me, UserRole::Student, true), me, now);

        assert!(slot.current(now).is_none());
    }

    #[test]
    fn typing_slot_is_last_write_wins() {
        let me = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut slot = TypingSlot::default();
        let now = Instant::now();

        slot.observe(&signal(first, UserRole::Admin, true), me, now);
        slot.observe(&signal(second, UserRole::Admin, true), me, now);

        assert_eq!(slot.current(now).map(|u| u.user_id), Some(second));
    }

    #[test]
    fn typing_slot_expires_after_three_seconds() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut slot = TypingSlot::default();
        let start = Instant::now();

        slot.observe(&signal(other, UserRole::Admin, true), me, start);
        assert!(slot.current(start + Duration::from_secs(2)).is_some());
        assert!(slot.current(start + TYPING_EXPIRY).is_none());
    }

    #[test]
    fn typing_slot_refresh_extends_the_window() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut slot = TypingSlot::default();
        let start = Instant::now();

        slot.observe(&signal(other, UserRole::Admin, true), me, start);
        let refresh = start + Duration::from_secs(2);
        slot.observe(&signal(other, UserRole::Admin, true), me, refresh);

        assert!(slot.current(start + Duration::from_secs(4)).is_some());
        assert!(slot.current(refresh + TYPING_EXPIRY).is_none());
    }

    #[test]
    fn typing_false_clears_immediately() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut slot = TypingSlot::default();
        let now = Instant::now();

        slot.observe(&signal(other, UserRole::Admin, true), me, now);
        slot.observe(&signal(other, UserRole::Admin, false), me, now);

        assert!(slot.current(now).is_none());
    }

    #[test]
    fn read_receipts_only_touch_foreign_messages() {
        let mut messages = vec![message(UserRole::Student), message(UserRole::Admin)];

        apply_read_receipts(&mut messages, UserRole::Admin);

        // Student-authored message is now read by the admin
        assert!(messages[0].read_by_admin);
        // Admin's own message keeps its flags
        assert!(messages[1].read_by_admin);
        assert!(!messages[1].read_by_student);
    }

    #[test]
    fn read_receipts_are_idempotent_and_monotonic() {
        let mut messages = vec![message(UserRole::Admin), message(UserRole::Admin)];

        apply_read_receipts(&mut messages, UserRole::Student);
        let after_once = messages.clone();
        apply_read_receipts(&mut messages, UserRole::Student);

        assert_eq!(messages, after_once);
        assert!(messages.iter().all(|m| m.read_by_student));
    }
}
