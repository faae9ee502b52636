//! State machine with a lazy, poll-driven completion protocol.
//!
//! Transitions are applied through exactly two entry points:
//! [`StateMachine::process_event`] and [`StateMachine::current_state`]. While an async
//! action is in flight, an accepted transition is only *requested*; the poll action of
//! the current state applies it once the action has cleared the async flag. A machine
//! that is never polled never observes that an async action finished.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Event;

/// Context that runs the actions named in a transition table.
///
/// Actions are plain values (usually small enums) so the table stays data; the context
/// interprets them and may drive the machine further, e.g. a poll action firing the
/// event that ends its state.
pub trait Actions: Sized {
    /// State identifier.
    type State: Copy + Eq + fmt::Debug;
    /// Entry action, run synchronously when a transition is accepted.
    type Entry: Copy + fmt::Debug;
    /// Poll action, run every time the machine is queried while its state is current.
    type Poll: Copy + fmt::Debug;

    /// Run an entry action.
    fn on_entry(&self, machine: &mut StateMachine<Self>, action: Self::Entry);

    /// Run a poll action.
    fn on_poll(&self, machine: &mut StateMachine<Self>, action: Self::Poll);
}

/// One row of a transition table.
pub struct Transition<A: Actions> {
    event: Event,
    target: A::State,
    entry: Option<A::Entry>,
    poll: Option<A::Poll>,
}

impl<A: Actions> Transition<A> {
    /// A transition to `target` on `event` without actions.
    pub fn new(event: Event, target: A::State) -> Self {
        Self {
            event,
            target,
            entry: None,
            poll: None,
        }
    }

    /// Set the entry action.
    pub fn entry(mut self, action: A::Entry) -> Self {
        self.entry = Some(action);
        self
    }

    /// Set the poll action that is active while `target` is current.
    pub fn poll(mut self, action: A::Poll) -> Self {
        self.poll = Some(action);
        self
    }
}

/// A declared state and its outgoing transitions.
pub struct State<A: Actions> {
    id: A::State,
    transitions: Vec<Transition<A>>,
}

impl<A: Actions> State<A> {
    /// A state without transitions.
    pub fn new(id: A::State) -> Self {
        Self {
            id,
            transitions: Vec::new(),
        }
    }

    /// Add an outgoing transition.
    pub fn on(mut self, transition: Transition<A>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// State identifier.
    #[inline]
    pub fn id(&self) -> A::State {
        self.id
    }

    fn transition(&self, event: Event) -> Option<&Transition<A>> {
        self.transitions.iter().find(|t| t.event == event)
    }
}

struct Requested<A: Actions> {
    target: A::State,
    poll: Option<A::Poll>,
}

/// Generic event-driven state machine.
pub struct StateMachine<A: Actions> {
    states: Vec<State<A>>,
    current: A::State,
    requested: Option<Requested<A>>,
    active_poll: Option<A::Poll>,
    async_active: Arc<AtomicBool>,
}

impl<A: Actions> StateMachine<A> {
    /// Create a machine in `initial`.
    ///
    /// # Panics
    ///
    /// Panics if `initial` or a transition target is not among `states`.
    pub fn new(initial: A::State, states: Vec<State<A>>) -> Self {
        let declared = |id: A::State| states.iter().any(|s| s.id == id);
        assert!(declared(initial), "initial state {initial:?} is not declared");
        for state in &states {
            for t in &state.transitions {
                assert!(
                    declared(t.target),
                    "transition {} from {:?} targets undeclared state {:?}",
                    t.event,
                    state.id,
                    t.target
                );
            }
        }

        Self {
            states,
            current: initial,
            requested: None,
            active_poll: None,
            async_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Feed an event to the machine.
    ///
    /// An event without a row in the current state's table is ignored. Otherwise the
    /// transition is requested, applied right away unless an async action is active, and
    /// its entry action runs in either case.
    pub fn process_event(&mut self, actions: &A, event: Event) {
        let Some((target, entry, poll)) = self
            .lookup(event)
            .map(|t| (t.target, t.entry, t.poll))
        else {
            tracing::trace!(state = ?self.current, %event, "event ignored");
            return;
        };

        self.requested = Some(Requested { target, poll });
        if !self.is_async_active() {
            self.apply_requested();
        } else {
            tracing::debug!(state = ?self.current, %event, ?target, "transition deferred");
        }

        if let Some(entry) = entry {
            actions.on_entry(self, entry);
        }
    }

    /// Run the active poll action, then return the current state.
    pub fn current_state(&mut self, actions: &A) -> A::State {
        if let Some(poll) = self.active_poll {
            actions.on_poll(self, poll);
        }
        self.current
    }

    /// Current state without running the poll action.
    #[inline]
    pub fn peek_state(&self) -> A::State {
        self.current
    }

    /// Whether a transition is waiting for the async action to finish.
    #[inline]
    pub fn has_requested(&self) -> bool {
        self.requested.is_some()
    }

    /// Apply the requested transition, if any. Returns whether one was applied.
    pub fn apply_requested(&mut self) -> bool {
        match self.requested.take() {
            Some(r) => {
                tracing::debug!(from = ?self.current, to = ?r.target, "transition");
                self.current = r.target;
                self.active_poll = r.poll;
                true
            }
            None => false,
        }
    }

    /// Whether an async action is in flight.
    #[inline]
    pub fn is_async_active(&self) -> bool {
        self.async_active.load(Ordering::Acquire)
    }

    /// Mark an async action as started or finished.
    #[inline]
    pub fn set_async_active(&self, active: bool) {
        self.async_active.store(active, Ordering::Release);
    }

    /// Shared handle to the async flag, for background actions that clear it themselves.
    pub fn async_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.async_active)
    }

    fn lookup(&self, event: Event) -> Option<&Transition<A>> {
        self.states
            .iter()
            .find(|s| s.id == self.current)
            .and_then(|s| s.transition(event))
    }
}

impl<A: Actions> fmt::Debug for StateMachine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("requested", &self.requested.as_ref().map(|r| r.target))
            .field("active_poll", &self.active_poll)
            .field("async_active", &self.is_async_active())
            .finish()
    }
}
