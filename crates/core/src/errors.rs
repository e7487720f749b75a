use thiserror::Error;

use crate::storage::StorageError;

/// Bad input recovered locally: the user is re-prompted in the same workflow
/// state and loses nothing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UserInputError {
    #[error("`{input}` is not a valid quantity")]
    InvalidQuantity { input: String },
    #[error("quantity {quantity} exceeds the maximum of 9999")]
    QuantityOutOfRange { quantity: u32 },
    #[error("unrecognized selection `{token}`")]
    UnrecognizedToken { token: String },
}

/// A requirement the conversation cannot proceed without. Terminates the
/// session with a guiding message; never retried automatically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreconditionUnmet {
    #[error("no areas are configured")]
    NoAreas,
    #[error("no shops exist in area {area_name}")]
    NoShops { area_name: String },
    #[error("no products are configured")]
    NoProducts,
    #[error("handle @{handle} is not registered")]
    UnregisteredHandle { handle: String },
    #[error("cannot confirm an empty order")]
    EmptyCart,
    #[error("no product was focused for quantity entry")]
    ProductFocusLost,
}

/// Failures the dispatcher turns into a generic message with a
/// support-contact hint. The cause is logged for operators, not shown.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
