//! Ordered, deduplicated conversation timeline
//!
//! Merge target for both producers (history fetch, live stream): a keyed set
//! indexed by message id, ordered by timestamp ascending with ties broken by
//! insertion order. The live channel may legitimately redeliver a message the
//! history fetch already returned; inserts are idempotent by id.

use std::collections::HashSet;

use uuid::Uuid;

use ticketlink_protocol::{Feedback, Message};

#[derive(Default)]
pub struct Timeline {
    /// Kept sorted by timestamp; equal timestamps stay in insertion order
    entries: Vec<Message>,
    seen: HashSet<Uuid>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message unless its id is already present
    ///
    /// Returns true when the message was new.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        // Position after every entry at or before this timestamp keeps
        // equal timestamps in arrival order.
        let at = self
            .entries
            .partition_point(|e| e.timestamp <= message.timestamp);
        self.entries.insert(at, message);
        true
    }

    /// Merge a batch from either producer; returns how many were new
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut inserted = 0;
        for message in batch {
            if self.insert(message) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Update the feedback on a message by id
    ///
    /// Returns false when the id is unknown.
    pub fn set_feedback(&mut self, id: Uuid, feedback: Feedback) -> bool {
        match self.entries.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.feedback = feedback;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the ordered sequence
    pub fn messages(&self) -> Vec<Message> {
        self.entries.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticketlink_protocol::{MessageKind, SenderRole};
    use time::OffsetDateTime;

    fn message_at(id: Uuid, ts: i64, content: &str) -> Message {
        Message {
            id,
            ticket_id: Uuid::nil(),
            sender_id: Some(Uuid::new_v4()),
            sender_role: SenderRole::EndUser,
            content: content.to_string(),
            kind: MessageKind::UserMessage,
            is_generated: false,
            feedback: Feedback::None,
            timestamp: OffsetDateTime::from_unix_timestamp(ts).unwrap(),
        }
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let mut timeline = Timeline::new();
        let a = message_at(Uuid::new_v4(), 10, "a");

        assert!(timeline.insert(a.clone()));
        assert!(!timeline.insert(a.clone()));
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_history_then_live_redelivery() {
        // History returns [A@10, B@20]; the live stream then redelivers B and
        // adds C@15. The reconciled order is [A, C, B], length 3.
        let mut timeline = Timeline::new();
        let a = message_at(Uuid::new_v4(), 10, "A");
        let b = message_at(Uuid::new_v4(), 20, "B");
        let c = message_at(Uuid::new_v4(), 15, "C");

        assert_eq!(timeline.merge(vec![a.clone(), b.clone()]), 2);
        assert_eq!(timeline.merge(vec![b.clone(), c.clone()]), 1);

        let contents: Vec<String> = timeline
            .messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["A", "C", "B"]);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut timeline = Timeline::new();
        let first = message_at(Uuid::new_v4(), 10, "first");
        let second = message_at(Uuid::new_v4(), 10, "second");
        let earlier = message_at(Uuid::new_v4(), 5, "earlier");

        timeline.insert(first);
        timeline.insert(second);
        timeline.insert(earlier);

        let contents: Vec<String> = timeline
            .messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["earlier", "first", "second"]);
    }

    #[test]
    fn test_set_feedback_by_id() {
        let mut timeline = Timeline::new();
        let message = message_at(Uuid::new_v4(), 10, "rate me");
        let id = message.id;
        timeline.insert(message);

        assert!(timeline.set_feedback(id, Feedback::Up));
        assert_eq!(timeline.messages()[0].feedback, Feedback::Up);

        assert!(!timeline.set_feedback(Uuid::new_v4(), Feedback::Down));
    }

    #[test]
    fn test_contains_tracks_every_seen_id() {
        let mut timeline = Timeline::new();
        let message = message_at(Uuid::new_v4(), 10, "x");
        let id = message.id;

        assert!(!timeline.contains(&id));
        timeline.insert(message);
        assert!(timeline.contains(&id));
    }
}
