//! Property-based tests for the store
//!
//! - Reaction merge keeps at most one reaction per sender
//! - Merging the same update twice is a no-op
//! - Appends keep `seq` strictly increasing and timestamps non-decreasing

use super::reactions::merge_reactions;
use super::*;
use proptest::prelude::*;

fn arb_reaction_type() -> impl Strategy<Value = ReactionType> {
    prop::sample::select(ReactionType::ALL.to_vec())
}

fn arb_reaction() -> impl Strategy<Value = Reaction> {
    (arb_reaction_type(), prop::sample::select(vec!["X", "Y", "Z", "me"]))
        .prop_map(|(kind, sender)| Reaction::new(kind, sender))
}

#[derive(Debug, Clone)]
enum Append {
    User,
    Recipient(&'static str),
    System,
}

fn arb_append() -> impl Strategy<Value = Append> {
    prop_oneof![
        Just(Append::User),
        Just(Append::Recipient("X")),
        Just(Append::Recipient("Y")),
        Just(Append::System),
    ]
}

proptest! {
    #[test]
    fn merge_keeps_one_reaction_per_sender(
        batches in prop::collection::vec(prop::collection::vec(arb_reaction(), 0..5), 0..6)
    ) {
        let mut reactions = Vec::new();
        for batch in batches {
            merge_reactions(&mut reactions, batch);
        }
        let mut senders: Vec<&str> = reactions.iter().map(|r| r.sender.as_str()).collect();
        let total = senders.len();
        senders.sort_unstable();
        senders.dedup();
        prop_assert_eq!(senders.len(), total);
    }

    #[test]
    fn merge_is_idempotent(batch in prop::collection::vec(arb_reaction(), 0..8)) {
        let mut reactions = Vec::new();
        merge_reactions(&mut reactions, batch.clone());
        let snapshot = reactions.clone();
        merge_reactions(&mut reactions, batch);
        // Re-applying can only reshuffle a sender whose batch held several
        // types; the (type, sender) set must be stable.
        let mut before: Vec<_> = snapshot.iter().map(|r| (r.kind as u8, r.sender.clone())).collect();
        let mut after: Vec<_> = reactions.iter().map(|r| (r.kind as u8, r.sender.clone())).collect();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn merge_without_conflicts_is_a_noop(batch in prop::collection::vec(arb_reaction(), 0..8)) {
        let mut reactions = Vec::new();
        merge_reactions(&mut reactions, batch);
        let snapshot = reactions.clone();
        let changed = merge_reactions(&mut reactions, snapshot.clone());
        prop_assert!(!changed);
        prop_assert_eq!(snapshot, reactions);
    }

    #[test]
    fn appends_are_ordered(ops in prop::collection::vec(arb_append(), 1..30)) {
        let store = ConversationStore::new();
        let conv = store
            .create_conversation(&["X".to_string(), "Y".to_string()])
            .unwrap();
        for op in ops {
            match op {
                Append::User => { store.append_user_message(&conv.id, "u", None).unwrap(); }
                Append::Recipient(name) => { store.append_recipient_message(&conv.id, name, "r").unwrap(); }
                Append::System => { store.append_system_message(&conv.id, "s").unwrap(); }
            }
        }
        let messages = store.messages(&conv.id).unwrap();
        for pair in messages.windows(2) {
            prop_assert!(pair[1].seq > pair[0].seq);
            prop_assert!(pair[1].timestamp >= pair[0].timestamp);
        }
    }
}
