//! Identifier resolution: UUID, free text, or pronoun → one owned record.
//!
//! The model cannot be trusted to supply exact keys, so the resolver is the
//! deterministic gate between loosely-specified identifiers and mutations.
//! A syntactically valid UUID that misses fails loudly instead of falling
//! back to text matching, and text that matches more than one record always
//! surfaces as [`ResolveError::Ambiguous`], never a guess.

use crate::context::ContextTracker;
use crate::entity::{ConversationId, Entity, EntityId, EntityKind, EntityRef, UserId};
use crate::error::ResolveError;
use crate::protocol::Candidate;
use crate::repo::EntityRepository;
use crate::trace::TraceLog;

/// Default cap on candidates carried by an ambiguous result.
pub const DEFAULT_CANDIDATE_CAP: usize = 5;

/// Pronoun-like identifiers that resolve from conversation memory rather
/// than the repository.
///
/// Covers the bare pronouns plus `the <kind>` / `that <kind>` / `this
/// <kind>` forms; an empty identifier counts too (a subject the model left
/// out means "the one we were just talking about").
pub fn is_pronoun(identifier: &str, kind: EntityKind) -> bool {
    let s = identifier.trim().to_lowercase();
    if s.is_empty() {
        return true;
    }
    if matches!(s.as_str(), "it" | "that" | "this" | "that one" | "this one") {
        return true;
    }
    let label = kind.as_label();
    s == format!("the {label}") || s == format!("that {label}") || s == format!("this {label}")
}

/// Turns identifier strings into concrete owned [`EntityRef`]s.
///
/// Borrowed per dispatch; holds no state of its own beyond the candidate
/// cap. Every successful resolution is recorded into the conversation
/// context so later pronouns land on the same record.
pub struct Resolver<'a> {
    repo: &'a dyn EntityRepository,
    contexts: &'a ContextTracker,
    trace: &'a TraceLog,
    candidate_cap: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(
        repo: &'a dyn EntityRepository,
        contexts: &'a ContextTracker,
        trace: &'a TraceLog,
    ) -> Self {
        Self {
            repo,
            contexts,
            trace,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
        }
    }

    /// Override the candidate cap (default 5).
    pub fn with_candidate_cap(mut self, cap: usize) -> Self {
        self.candidate_cap = cap.max(1);
        self
    }

    /// Resolve `identifier` to one record of `kind` owned by `user`.
    ///
    /// The algorithm, in order:
    /// 1. Pronoun-like or empty → the conversation's last mention of `kind`,
    ///    re-fetched by id so a deleted referent fails instead of going stale.
    /// 2. Well-formed UUID → direct owned lookup; a miss is final.
    /// 3. Free text → exact case-insensitive title match when unique,
    ///    otherwise substring match: one hit wins, several become an
    ///    ambiguous result with a capped, stably-ordered candidate list.
    pub fn resolve(
        &self,
        identifier: &str,
        kind: EntityKind,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<EntityRef, ResolveError> {
        let identifier = identifier.trim();

        if is_pronoun(identifier, kind) {
            return self.resolve_from_context(identifier, kind, user, conversation);
        }

        if let Some(id) = EntityId::parse(identifier) {
            let found = self.repo.find_by_id(user, kind, id)?;
            self.trace
                .query(kind, &format!("id = {id}"), usize::from(found.is_some()));
            return match found {
                Some(entity) => Ok(self.hit(entity, conversation)),
                // A wrong UUID fails loudly; no text fallthrough.
                None => Err(ResolveError::NotFound {
                    identifier: identifier.to_string(),
                    kind,
                }),
            };
        }

        self.resolve_text(identifier, kind, user, conversation)
    }

    fn resolve_from_context(
        &self,
        identifier: &str,
        kind: EntityKind,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<EntityRef, ResolveError> {
        let Some(mention) = self.contexts.resolve_pronoun(conversation, kind) else {
            tracing::debug!(%kind, identifier, "pronoun with no prior mention");
            return Err(ResolveError::NoPriorMention { kind });
        };
        // Re-verify the referent: the record may have been deleted since.
        match self.repo.find_by_id(user, kind, mention.id)? {
            Some(entity) => Ok(self.hit(entity, conversation)),
            None => {
                self.contexts.forget_mention(conversation, kind);
                Err(ResolveError::NoPriorMention { kind })
            }
        }
    }

    fn resolve_text(
        &self,
        identifier: &str,
        kind: EntityKind,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<EntityRef, ResolveError> {
        let needle = identifier.to_lowercase();
        let mut matches = self.repo.find_by_title_substring(user, kind, &needle)?;
        self.trace
            .query(kind, &format!("title contains `{needle}`"), matches.len());

        // Exact case-insensitive title match wins when it is unique; with
        // several exact matches we keep the full substring set so the
        // candidate list shows everything that could have been meant.
        let mut exact = matches.iter().filter(|e| e.title().to_lowercase() == needle);
        if let (Some(single), None) = (exact.next(), exact.next()) {
            return Ok(self.hit(single.clone(), conversation));
        }

        match matches.len() {
            0 => Err(ResolveError::NotFound {
                identifier: identifier.to_string(),
                kind,
            }),
            1 => Ok(self.hit(matches.remove(0), conversation)),
            count => Err(ResolveError::Ambiguous {
                identifier: identifier.to_string(),
                kind,
                count,
                candidates: self.candidates(matches),
            }),
        }
    }

    /// Record the mention and hand back the ephemeral reference.
    fn hit(&self, entity: Entity, conversation: &ConversationId) -> EntityRef {
        let entity_ref = entity.entity_ref();
        self.contexts.record_mention(conversation, entity_ref.clone());
        entity_ref
    }

    /// Stable, capped candidate list: sorted by title then id so the same
    /// ambiguity produces the same choices on every retry.
    fn candidates(&self, mut matches: Vec<Entity>) -> Vec<Candidate> {
        matches.sort_by(|a, b| {
            a.title()
                .cmp(b.title())
                .then_with(|| a.id().cmp(&b.id()))
        });
        matches
            .iter()
            .take(self.candidate_cap)
            .map(|e| Candidate {
                id: e.id(),
                title: e.title().to_string(),
                distinguishing_field: e.distinguishing_field(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Task, TaskStatus};
    use crate::repo::MemoryRepository;

    fn owner() -> UserId {
        UserId::new("u-1")
    }

    fn conv() -> ConversationId {
        ConversationId::new("c-1")
    }

    struct Fixture {
        repo: MemoryRepository,
        contexts: ContextTracker,
        trace: TraceLog,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                repo: MemoryRepository::new(),
                contexts: ContextTracker::new(),
                trace: TraceLog::disabled(),
            }
        }

        fn resolver(&self) -> Resolver<'_> {
            Resolver::new(&self.repo, &self.contexts, &self.trace)
        }

        fn add_task(&self, title: &str) -> EntityId {
            let ent = Entity::Task(Task::new(owner(), title));
            let id = ent.id();
            self.repo.insert(ent).unwrap();
            id
        }
    }

    #[test]
    fn uuid_hit_resolves_directly() {
        let fx = Fixture::new();
        let id = fx.add_task("Buy milk");
        let r = fx
            .resolver()
            .resolve(&id.to_string(), EntityKind::Task, &owner(), &conv())
            .unwrap();
        assert_eq!(r.id, id);
        assert_eq!(r.display_name, "Buy milk");
    }

    #[test]
    fn uuid_miss_never_falls_back_to_text() {
        let fx = Fixture::new();
        // Task titled exactly like a UUID could only be reached by text; a
        // syntactically valid UUID must still miss.
        fx.add_task("Buy milk");
        let stray = EntityId::new();
        let err = fx
            .resolver()
            .resolve(&stray.to_string(), EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn unique_exact_title_beats_substring_cousins() {
        let fx = Fixture::new();
        let exact = fx.add_task("Report");
        fx.add_task("Report draft");
        fx.add_task("Quarterly report review");

        let r = fx
            .resolver()
            .resolve("report", EntityKind::Task, &owner(), &conv())
            .unwrap();
        assert_eq!(r.id, exact);
    }

    #[test]
    fn single_substring_match_resolves_and_records_mention() {
        let fx = Fixture::new();
        let id = fx.add_task("Team meeting prep");
        fx.add_task("Buy milk");

        let r = fx
            .resolver()
            .resolve("meeting", EntityKind::Task, &owner(), &conv())
            .unwrap();
        assert_eq!(r.id, id);

        let remembered = fx.contexts.resolve_pronoun(&conv(), EntityKind::Task);
        assert_eq!(remembered.unwrap().id, id);
    }

    #[test]
    fn several_matches_are_ambiguous_never_a_pick() {
        let fx = Fixture::new();
        let mut done = Task::new(owner(), "Test");
        done.set_status(TaskStatus::Done);
        fx.repo.insert(Entity::Task(done)).unwrap();
        let todo = Task::new(owner(), "Test");
        fx.repo.insert(Entity::Task(todo)).unwrap();

        let err = fx
            .resolver()
            .resolve("Test", EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        let ResolveError::Ambiguous { count, candidates, .. } = err else {
            panic!("expected ambiguous");
        };
        assert_eq!(count, 2);
        assert_eq!(candidates.len(), 2);
        let fields: Vec<_> = candidates
            .iter()
            .map(|c| c.distinguishing_field.as_str())
            .collect();
        assert!(fields.contains(&"status: todo"));
        assert!(fields.contains(&"status: done"));
    }

    #[test]
    fn candidate_list_is_capped_and_stable() {
        let fx = Fixture::new();
        for i in 0..8 {
            fx.add_task(&format!("Chore {i}"));
        }
        let resolver = fx.resolver().with_candidate_cap(5);
        let first = resolver
            .resolve("chore", EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        let second = resolver
            .resolve("chore", EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        let (ResolveError::Ambiguous { count, candidates: a, .. }, ResolveError::Ambiguous { candidates: b, .. }) =
            (first, second)
        else {
            panic!("expected ambiguous");
        };
        assert_eq!(count, 8);
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_matches_is_not_found() {
        let fx = Fixture::new();
        fx.add_task("Buy milk");
        let err = fx
            .resolver()
            .resolve("invoice", EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn pronoun_resolves_last_mention_of_right_kind() {
        let fx = Fixture::new();
        let id = fx.add_task("Ship release");
        let resolver = fx.resolver();
        resolver
            .resolve("ship release", EntityKind::Task, &owner(), &conv())
            .unwrap();

        for pronoun in ["it", "that", "the task", "this task", ""] {
            let r = resolver
                .resolve(pronoun, EntityKind::Task, &owner(), &conv())
                .unwrap();
            assert_eq!(r.id, id, "pronoun `{pronoun}`");
        }

        // No project was ever mentioned.
        let err = resolver
            .resolve("it", EntityKind::Project, &owner(), &conv())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoPriorMention { .. }));
    }

    #[test]
    fn stale_pronoun_is_cleared_not_served() {
        let fx = Fixture::new();
        let id = fx.add_task("Ephemeral");
        let resolver = fx.resolver();
        resolver
            .resolve("ephemeral", EntityKind::Task, &owner(), &conv())
            .unwrap();
        fx.repo.soft_delete(&owner(), EntityKind::Task, id).unwrap();

        let err = resolver
            .resolve("it", EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoPriorMention { .. }));
        // The stale mention is gone for good.
        assert!(fx.contexts.resolve_pronoun(&conv(), EntityKind::Task).is_none());
    }

    #[test]
    fn cross_user_titles_never_leak() {
        let fx = Fixture::new();
        fx.repo
            .insert(Entity::Task(Task::new(UserId::new("u-2"), "Secret plan")))
            .unwrap();
        let err = fx
            .resolver()
            .resolve("Secret plan", EntityKind::Task, &owner(), &conv())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }
}
