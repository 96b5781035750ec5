//! Property-based tests for speaker selection
//!
//! - The user is never chosen and the last speaker never follows itself
//! - Automatic chains stop at `max_auto_turns`
//! - Simulated chains never put the same speaker twice in a row

use super::*;
use chrono::Utc;
use proptest::prelude::*;

fn arb_recipients() -> impl Strategy<Value = Vec<Recipient>> {
    prop::sample::subsequence(vec!["A", "B", "C", "D", "E"], 1..=5)
        .prop_map(|names| names.into_iter().map(Recipient::new).collect())
}

fn arb_config() -> impl Strategy<Value = EngineConfig> {
    (0u32..6, 0.0f64..=1.0).prop_map(|(max_auto_turns, continue_probability)| EngineConfig {
        max_auto_turns,
        continue_probability,
        ..EngineConfig::default()
    })
}

fn message(sender: Sender) -> Message {
    Message {
        id: "m".to_string(),
        seq: 1,
        sender,
        content: String::new(),
        html_content: None,
        timestamp: Utc::now(),
        reactions: vec![],
    }
}

proptest! {
    #[test]
    fn never_picks_last_speaker(
        recipients in arb_recipients(),
        config in arb_config(),
        last_index in any::<prop::sample::Index>(),
        turns in 0u32..8,
        seed in any::<u64>(),
    ) {
        let selector = TurnSelector::seeded(&config, seed);
        let last_name = last_index.get(&recipients).name.clone();
        let last = message(Sender::recipient(last_name.clone()));

        if let Some(pick) = selector.select_next_speaker(&recipients, Some(&last), turns) {
            prop_assert_ne!(&pick.name, &last_name);
            prop_assert!(recipients.iter().any(|r| r.name == pick.name));
            prop_assert!(turns < config.max_auto_turns);
        }
    }

    #[test]
    fn user_message_opens_chain(
        recipients in arb_recipients(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let selector = TurnSelector::seeded(&config, seed);
        let last = message(Sender::User);
        prop_assert!(selector.select_next_speaker(&recipients, Some(&last), 0).is_some());
    }

    #[test]
    fn simulated_chain_is_bounded_and_alternates(
        recipients in arb_recipients(),
        config in arb_config(),
        seed in any::<u64>(),
    ) {
        let selector = TurnSelector::seeded(&config, seed);
        let mut last = message(Sender::User);
        let mut turns = 0u32;
        let mut speakers: Vec<String> = Vec::new();

        while let Some(pick) = selector.select_next_speaker(&recipients, Some(&last), turns) {
            speakers.push(pick.name.clone());
            last = message(Sender::recipient(pick.name));
            turns += 1;
            prop_assert!(turns <= config.max_auto_turns.max(1));
        }

        for pair in speakers.windows(2) {
            prop_assert_ne!(&pair[0], &pair[1]);
        }
    }
}
