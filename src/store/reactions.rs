//! Reaction merge rules
//!
//! A message carries at most one reaction per sender. Incoming updates are
//! merged, never used as a replacement list.

use super::model::Reaction;

/// Merge `incoming` into `existing`.
///
/// An incoming reaction whose (type, sender) pair is already present is
/// dropped. One from a sender who already reacted with another type replaces
/// that sender's earlier reaction. Everything else is appended in order.
/// Returns true if `existing` changed.
pub fn merge_reactions(existing: &mut Vec<Reaction>, incoming: Vec<Reaction>) -> bool {
    let mut changed = false;
    for reaction in incoming {
        if existing.iter().any(|r| r.key() == reaction.key()) {
            continue;
        }
        existing.retain(|r| r.sender != reaction.sender);
        existing.push(reaction);
        changed = true;
    }
    changed
}

/// Toggle a reaction the way a user tapping it would.
///
/// Tapping the same reaction again removes it; tapping a different one
/// replaces the sender's previous reaction.
pub fn toggle_reaction(existing: &mut Vec<Reaction>, reaction: Reaction) {
    let before = existing.len();
    existing.retain(|r| r.key() != reaction.key());
    if existing.len() != before {
        return;
    }
    existing.retain(|r| r.sender != reaction.sender);
    existing.push(reaction);
}
