use serde::{Deserialize, Serialize};

use crate::domain::{AreaId, ProductId, ShopId};

/// Conversation steps, in order. `VerifyPhoto` only appears when the
/// deployment requires on-site proof; the transition table skips it otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    SelectArea,
    SelectShop,
    VerifyPhoto,
    SelectProducts,
    EnterQuantity,
    ConfirmOrder,
}

/// Cart-stage actions (the `action:` token family).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartAction {
    Confirm,
    Clear,
    Submit,
    Cancel,
}

/// Backward-navigation targets (the `back:` token family). Back navigation is
/// always available and re-renders from stored session context without
/// re-validating earlier choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackTarget {
    Areas,
    Shops,
    Products,
}

/// The closed set of interaction events the state machine dispatches on.
/// Raw button tokens are parsed into these variants at the messaging
/// boundary; the machine itself never sees a string prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    AreaChosen(AreaId),
    ShopChosen(ShopId),
    /// Emitted by the workflow once the freshness verifier accepts a photo.
    /// Rejected photos never produce an event; the session stays put.
    PhotoAccepted,
    ProductChosen(ProductId),
    /// Quantity from a quick-pick button or validated free-form input.
    /// Zero removes the focused product from the cart.
    QuantitySet(u32),
    ActionTaken(CartAction),
    BackRequested(BackTarget),
}

/// Session facts the transition table needs for its guards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowContext {
    /// Whether this deployment gates product selection on photo verification.
    pub photo_gate: bool,
    /// Whether the cart currently holds at least one positive-quantity entry.
    pub cart_has_items: bool,
    /// Whether a product is focused for quantity entry.
    pub product_focused: bool,
}

/// Side effects a transition asks the workflow to perform, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    LoadAreas,
    LoadShops,
    InitCart,
    RequestPhoto,
    ShowProducts,
    PromptQuantity,
    ApplyQuantity(u32),
    ClearCart,
    ShowConfirmation,
    PersistOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    Submitted,
    Cancelled,
}

/// Where the session goes after a transition: another step, or gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDisposition {
    Continue(FlowState),
    End(EndReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowDisposition,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
