//! A small generic state machine driver, adapted from the teacher's
//! `mm2_state_machine` crate. The teacher's version is event-sourced
//! (`StorableStateMachine`/`StorableState`) because swap sessions there are
//! rebuilt by replaying an append-only event log. Here the persistence model
//! (spec.md §3/§6, `privacy_db`) is a single-writer snapshot store keyed by
//! session id, not an event log, so this crate keeps the teacher's
//! compile-time-checked transition graph (`State`, `TransitionFrom`,
//! `change_state`) and drops the event-sourcing half — recorded as an Open
//! Question decision in DESIGN.md.

use async_trait::async_trait;

pub trait StateMachineTrait: Send + Sized {
    type Result: Send;
}

pub enum StateResult<M: StateMachineTrait> {
    ChangeState(Box<dyn State<StateMachine = M>>),
    Finish(M::Result),
}

#[async_trait]
pub trait State: Send + Sync {
    type StateMachine: StateMachineTrait;

    async fn on_changed(self: Box<Self>, machine: &mut Self::StateMachine) -> StateResult<Self::StateMachine>;

    /// Human-readable label used for logging transitions; overridden by each
    /// concrete state.
    fn label(&self) -> &'static str;
}

/// Marker trait: `Next` may only be reached from `Prev`. Checked at compile
/// time through the bound on [`ChangeStateExt::change_state`], the same
/// pattern as the teacher's `TransitionFrom`.
pub trait TransitionFrom<Prev> {}

#[async_trait]
pub trait ChangeStateExt: State + Sized {
    async fn change_state<Next>(next_state: Next) -> StateResult<Self::StateMachine>
    where
        Next: State<StateMachine = Self::StateMachine> + TransitionFrom<Self> + 'static,
    {
        StateResult::ChangeState(Box::new(next_state))
    }
}

impl<S: State> ChangeStateExt for S {}

#[async_trait]
pub trait StateMachineExt: StateMachineTrait {
    /// Drives the machine from `state` to completion, returning the terminal
    /// `Result`. Each transition is logged at `debug` via the state's label.
    async fn run(&mut self, mut state: Box<dyn State<StateMachine = Self>>) -> Self::Result {
        loop {
            log::debug!("state machine: entering {}", state.label());
            match state.on_changed(self).await {
                StateResult::ChangeState(next) => state = next,
                StateResult::Finish(result) => return result,
            }
        }
    }
}

impl<M: StateMachineTrait> StateMachineExt for M {}
