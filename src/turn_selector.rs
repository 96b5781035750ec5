//! Speaker selection
//!
//! Decides who talks next. The rules are deterministic apart from two
//! random draws (who, and whether to continue a chain), both taken from an
//! injectable random source so tests can seed it.

#[cfg(test)]
mod proptests;

use crate::config::EngineConfig;
use crate::store::{Message, ReactionType, Recipient, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::{Mutex, PoisonError};

type SharedRng = Mutex<Box<dyn RngCore + Send>>;

pub struct TurnSelector {
    max_auto_turns: u32,
    continue_probability: f64,
    reaction_probability: f64,
    rng: SharedRng,
}

impl TurnSelector {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_rng(config, Box::new(StdRng::from_entropy()))
    }

    /// Deterministic selector for tests and replays
    pub fn seeded(config: &EngineConfig, seed: u64) -> Self {
        Self::with_rng(config, Box::new(StdRng::seed_from_u64(seed)))
    }

    pub fn with_rng(config: &EngineConfig, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            max_auto_turns: config.max_auto_turns,
            continue_probability: config.continue_probability.clamp(0.0, 1.0),
            reaction_probability: config.reaction_probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    /// Recipients allowed to speak after `last_message`: everyone except
    /// whoever spoke last.
    pub fn eligible_candidates<'a>(
        recipients: &'a [Recipient],
        last_message: Option<&Message>,
    ) -> Vec<&'a Recipient> {
        let last_speaker = last_message.and_then(|m| m.sender.recipient_name());
        recipients
            .iter()
            .filter(|r| Some(r.name.as_str()) != last_speaker)
            .collect()
    }

    /// Pick the next automatic speaker, or `None` to end the chain.
    ///
    /// `last_message` should skip system notices. With no history, or after
    /// a user message, any recipient may open. After an automatic message
    /// the chain only continues while under `max_auto_turns` and the
    /// continuation roll succeeds.
    pub fn select_next_speaker(
        &self,
        recipients: &[Recipient],
        last_message: Option<&Message>,
        turns_since_last_user_message: u32,
    ) -> Option<Recipient> {
        if let Some(Sender::Recipient(_)) = last_message.map(|m| &m.sender) {
            if turns_since_last_user_message >= self.max_auto_turns {
                return None;
            }
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            if !rng.gen_bool(self.continue_probability) {
                return None;
            }
        }
        self.select_opening_speaker(recipients, last_message)
    }

    /// Pick a speaker to answer a trigger: no chain bound, no continuation
    /// roll, but still never whoever spoke last.
    pub fn select_opening_speaker(
        &self,
        recipients: &[Recipient],
        last_message: Option<&Message>,
    ) -> Option<Recipient> {
        let candidates = Self::eligible_candidates(recipients, last_message);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let rng: &mut Box<dyn RngCore + Send> = &mut rng;
        candidates.choose(rng).map(|r| (*r).clone())
    }

    /// Maybe pick a recipient (not `speaker`) to react, and how
    pub fn select_reaction(
        &self,
        recipients: &[Recipient],
        speaker: &str,
    ) -> Option<(String, ReactionType)> {
        let others: Vec<&Recipient> = recipients.iter().filter(|r| r.name != speaker).collect();
        if others.is_empty() {
            return None;
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let rng: &mut Box<dyn RngCore + Send> = &mut rng;

        if !rng.gen_bool(self.reaction_probability) {
            return None;
        }
        let reactor = others.choose(rng)?;
        let kind = *ReactionType::ALL.choose(rng)?;
        Some((reactor.name.clone(), kind))
    }
}
