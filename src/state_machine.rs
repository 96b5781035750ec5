//! Per-conversation scheduling state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! the executor feeds events in, runs the returned effects, and feeds the
//! events those effects produce back in.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{ConvContext, ConvState, GenerationTask, Trigger};
pub use transition::{transition, TransitionError, TransitionResult};
