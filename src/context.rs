//! Per-conversation short-term memory.
//!
//! Tracks the last entity mentioned of each kind so pronoun-like identifiers
//! ("it", "that project") resolve to what the conversation was just about.
//! One [`ConversationContext`] per conversation id, owned by the
//! [`ContextTracker`]; never shared across conversations or users.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::entity::{ConversationId, EntityKind, EntityRef};

// ── ConversationContext ──────────────────────────────────────────────────

/// What one conversation was most recently about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    /// At most one referent per kind; a new mention replaces the old one.
    pub last_mentioned: HashMap<EntityKind, EntityRef>,
    /// Last time this conversation touched the engine.
    pub last_activity: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            last_mentioned: HashMap::new(),
            last_activity: Utc::now(),
        }
    }

    /// Replace the referent for the mention's kind.
    pub fn mention(&mut self, entity_ref: EntityRef) {
        self.last_mentioned.insert(entity_ref.kind, entity_ref);
        self.last_activity = Utc::now();
    }

    /// The last referent of `kind`, if any.
    pub fn last_of(&self, kind: EntityKind) -> Option<&EntityRef> {
        self.last_mentioned.get(&kind)
    }

    /// Drop the referent of `kind` (e.g. it turned out to be deleted).
    pub fn forget(&mut self, kind: EntityKind) {
        self.last_mentioned.remove(&kind);
    }

    /// How long since this conversation last touched the engine.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity
    }
}

// ── ContextTracker ───────────────────────────────────────────────────────

/// Engine-owned map of conversation contexts.
///
/// The only shared mutable state the engine owns. All mutation goes through
/// the map's entry API, which serializes concurrent updates for the same
/// conversation id; different conversations never contend.
pub struct ContextTracker {
    contexts: DashMap<ConversationId, ConversationContext>,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
        }
    }

    /// Snapshot of a conversation's context, created empty on first access.
    pub fn get(&self, conversation_id: &ConversationId) -> ConversationContext {
        self.contexts
            .entry(conversation_id.clone())
            .or_insert_with(|| ConversationContext::new(conversation_id.clone()))
            .clone()
    }

    /// Record a successful resolution or creation.
    pub fn record_mention(&self, conversation_id: &ConversationId, entity_ref: EntityRef) {
        self.contexts
            .entry(conversation_id.clone())
            .or_insert_with(|| ConversationContext::new(conversation_id.clone()))
            .mention(entity_ref);
    }

    /// Resolve a pronoun-like identifier to the last mention of `kind`.
    ///
    /// Counts as conversation activity for eviction purposes.
    pub fn resolve_pronoun(
        &self,
        conversation_id: &ConversationId,
        kind: EntityKind,
    ) -> Option<EntityRef> {
        let mut ctx = self
            .contexts
            .entry(conversation_id.clone())
            .or_insert_with(|| ConversationContext::new(conversation_id.clone()));
        ctx.last_activity = Utc::now();
        ctx.last_of(kind).cloned()
    }

    /// Drop a stale referent (a pronoun resolved to a record that no longer
    /// exists).
    pub fn forget_mention(&self, conversation_id: &ConversationId, kind: EntityKind) {
        if let Some(mut ctx) = self.contexts.get_mut(conversation_id) {
            ctx.forget(kind);
        }
    }

    /// Evict conversations idle longer than `max_idle`. Returns how many
    /// were dropped. Never called implicitly; the embedding application owns
    /// the expiry policy.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let before = self.contexts.len();
        self.contexts.retain(|_, ctx| ctx.idle_for(now) <= max_idle);
        before - self.contexts.len()
    }

    /// Number of tracked conversations.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextTracker")
            .field("conversations", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    fn conv(s: &str) -> ConversationId {
        ConversationId::new(s)
    }

    fn r(kind: EntityKind, name: &str) -> EntityRef {
        EntityRef {
            kind,
            id: EntityId::new(),
            display_name: name.into(),
        }
    }

    #[test]
    fn first_access_creates_empty_context() {
        let tracker = ContextTracker::new();
        let ctx = tracker.get(&conv("c-1"));
        assert!(ctx.last_mentioned.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn mention_replaces_per_kind() {
        let tracker = ContextTracker::new();
        let id = conv("c-1");
        tracker.record_mention(&id, r(EntityKind::Task, "First"));
        tracker.record_mention(&id, r(EntityKind::Task, "Second"));
        tracker.record_mention(&id, r(EntityKind::Note, "A note"));

        let ctx = tracker.get(&id);
        assert_eq!(ctx.last_mentioned.len(), 2);
        assert_eq!(ctx.last_of(EntityKind::Task).unwrap().display_name, "Second");
        assert_eq!(ctx.last_of(EntityKind::Note).unwrap().display_name, "A note");
    }

    #[test]
    fn resolve_pronoun_reads_last_mention() {
        let tracker = ContextTracker::new();
        let id = conv("c-1");
        assert!(tracker.resolve_pronoun(&id, EntityKind::Task).is_none());

        let task = r(EntityKind::Task, "Ship release");
        tracker.record_mention(&id, task.clone());
        assert_eq!(tracker.resolve_pronoun(&id, EntityKind::Task), Some(task));
        assert!(tracker.resolve_pronoun(&id, EntityKind::Event).is_none());
    }

    #[test]
    fn conversations_are_isolated() {
        let tracker = ContextTracker::new();
        tracker.record_mention(&conv("c-1"), r(EntityKind::Task, "Mine"));
        assert!(
            tracker
                .resolve_pronoun(&conv("c-2"), EntityKind::Task)
                .is_none()
        );
    }

    #[test]
    fn forget_clears_one_kind_only() {
        let tracker = ContextTracker::new();
        let id = conv("c-1");
        tracker.record_mention(&id, r(EntityKind::Task, "T"));
        tracker.record_mention(&id, r(EntityKind::Project, "P"));
        tracker.forget_mention(&id, EntityKind::Task);

        let ctx = tracker.get(&id);
        assert!(ctx.last_of(EntityKind::Task).is_none());
        assert!(ctx.last_of(EntityKind::Project).is_some());
    }

    #[test]
    fn evict_idle_drops_stale_conversations() {
        let tracker = ContextTracker::new();
        tracker.record_mention(&conv("fresh"), r(EntityKind::Task, "T"));
        {
            let mut stale = tracker
                .contexts
                .entry(conv("stale"))
                .or_insert_with(|| ConversationContext::new(conv("stale")));
            stale.last_activity = Utc::now() - Duration::hours(3);
        }

        let dropped = tracker.evict_idle(Duration::hours(1));
        assert_eq!(dropped, 1);
        assert_eq!(tracker.len(), 1);
        assert!(
            tracker
                .resolve_pronoun(&conv("fresh"), EntityKind::Task)
                .is_some()
        );
    }

    #[test]
    fn concurrent_mentions_keep_one_referent_per_kind() {
        use std::sync::Arc;
        let tracker = Arc::new(ContextTracker::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    tracker.record_mention(&conv("busy"), r(EntityKind::Task, &format!("t{i}")));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let ctx = tracker.get(&conv("busy"));
        assert_eq!(ctx.last_mentioned.len(), 1);
    }
}
