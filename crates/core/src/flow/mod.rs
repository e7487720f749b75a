//! The order-taking conversation state machine.
//!
//! `states` holds the closed sets of states and boundary events; `engine`
//! holds the pure transition table. Side effects (catalog reads, cart
//! mutation, persistence) are expressed as [`states::FlowAction`] values and
//! executed by the workflow layer, never inside a transition.

pub mod engine;
pub mod states;

pub use engine::{transition, FlowTransitionError, MAX_QUANTITY};
pub use states::{
    BackTarget, CartAction, EndReason, FlowAction, FlowContext, FlowDisposition, FlowEvent,
    FlowState, TransitionOutcome,
};
