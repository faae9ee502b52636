//! Generic state-machine engine.
//!
//! A machine owns a table of [`State`]s, each mapping [`Event`]s to [`Transition`]s
//! that name a target state, an entry action and a poll action. The embedding type
//! implements [`Actions`] to run them.

mod event;
mod machine;

pub use event::Event;
pub use machine::{Actions, State, StateMachine, Transition};
