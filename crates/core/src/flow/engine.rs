use thiserror::Error;

use crate::flow::states::{
    BackTarget, CartAction, EndReason, FlowAction, FlowContext, FlowDisposition, FlowEvent,
    FlowState, TransitionOutcome,
};

/// Upper bound for a single line quantity, inclusive.
pub const MAX_QUANTITY: u32 = 9_999;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
    #[error("quantity {quantity} exceeds the maximum of {MAX_QUANTITY}")]
    QuantityOutOfRange { quantity: u32 },
    #[error("no product is focused for quantity entry")]
    NoProductFocused,
    #[error("cannot confirm an order with an empty cart")]
    EmptyCart,
}

/// The pure transition table. Guards read only [`FlowContext`]; every side
/// effect is returned as a [`FlowAction`] for the workflow to execute.
pub fn transition(
    current: FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ApplyQuantity, ClearCart, InitCart, LoadAreas, LoadShops, PersistOrder, PromptQuantity,
        RequestPhoto, ShowConfirmation, ShowProducts,
    };
    use FlowDisposition::{Continue, End};
    use FlowState::{
        ConfirmOrder, EnterQuantity, SelectArea, SelectProducts, SelectShop, VerifyPhoto,
    };

    let (to, actions) = match (current, event) {
        // A cancel action or /cancel command is honoured from any step.
        (_, FlowEvent::ActionTaken(CartAction::Cancel)) => {
            (End(EndReason::Cancelled), Vec::new())
        }

        (SelectArea, FlowEvent::AreaChosen(_)) => (Continue(SelectShop), vec![LoadShops]),

        (SelectShop, FlowEvent::ShopChosen(_)) => {
            if context.photo_gate {
                (Continue(VerifyPhoto), vec![InitCart, RequestPhoto])
            } else {
                (Continue(SelectProducts), vec![InitCart, ShowProducts])
            }
        }
        (SelectShop, FlowEvent::BackRequested(BackTarget::Areas)) => {
            (Continue(SelectArea), vec![LoadAreas])
        }

        (VerifyPhoto, FlowEvent::PhotoAccepted) => (Continue(SelectProducts), vec![ShowProducts]),
        (VerifyPhoto, FlowEvent::BackRequested(BackTarget::Shops)) => {
            (Continue(SelectShop), vec![LoadShops])
        }

        (SelectProducts, FlowEvent::ProductChosen(_)) => {
            (Continue(EnterQuantity), vec![PromptQuantity])
        }
        (SelectProducts, FlowEvent::ActionTaken(CartAction::Confirm)) => {
            if !context.cart_has_items {
                return Err(FlowTransitionError::EmptyCart);
            }
            (Continue(ConfirmOrder), vec![ShowConfirmation])
        }
        (SelectProducts, FlowEvent::ActionTaken(CartAction::Clear)) => {
            (Continue(SelectProducts), vec![ClearCart, ShowProducts])
        }
        (SelectProducts, FlowEvent::BackRequested(BackTarget::Shops)) => {
            (Continue(SelectShop), vec![LoadShops])
        }

        (EnterQuantity, FlowEvent::QuantitySet(quantity)) => {
            if *quantity > MAX_QUANTITY {
                return Err(FlowTransitionError::QuantityOutOfRange { quantity: *quantity });
            }
            if !context.product_focused {
                return Err(FlowTransitionError::NoProductFocused);
            }
            (Continue(SelectProducts), vec![ApplyQuantity(*quantity), ShowProducts])
        }
        (EnterQuantity, FlowEvent::BackRequested(BackTarget::Products)) => {
            (Continue(SelectProducts), vec![ShowProducts])
        }

        (ConfirmOrder, FlowEvent::ActionTaken(CartAction::Submit)) => {
            (End(EndReason::Submitted), vec![PersistOrder])
        }
        // "Edit order" returns to product selection without clearing the cart.
        (ConfirmOrder, FlowEvent::BackRequested(BackTarget::Products)) => {
            (Continue(SelectProducts), vec![ShowProducts])
        }

        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: current, to, event: *event, actions })
}
