use rust_decimal::Decimal;

use crate::domain::{Area, OrderId, OrderStatus, OrderSummary, Product, Shop};
use crate::errors::{PreconditionUnmet, UserInputError};
use crate::verify::{VerificationFailure, VerifiedPhoto};

/// Product row in the selection menu, annotated with what the cart already
/// holds so the rendering layer can badge it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuProduct {
    pub product: Product,
    pub in_cart: u32,
}

/// One confirmation line with its discounted total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedLine {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub line_total: Decimal,
}

/// Everything the workflow can say back to the user, transport-neutral.
/// The messaging crate turns these into text and keyboards; the workflow
/// never formats a user-facing string itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    RegistrationRequired { handle: String },
    AreaMenu { areas: Vec<Area> },
    ShopMenu { area: Area, shops: Vec<Shop> },
    PhotoPrompt { shop: Shop, max_age_secs: i64 },
    /// Photo failed verification; the session holds in the photo step and
    /// the user may simply send another photo.
    PhotoRejected { failure: VerificationFailure, max_age_secs: i64 },
    ProductMenu {
        shop: Shop,
        products: Vec<MenuProduct>,
        cart_total: u64,
        /// Present only on the render immediately after a photo passed.
        verified: Option<VerifiedPhoto>,
    },
    QuantityPrompt { product: Product, in_cart: u32 },
    /// Recoverable input problem; re-prompt without losing any state.
    Rejected { error: UserInputError },
    Confirmation {
        area_name: String,
        shop_name: String,
        lines: Vec<PricedLine>,
        total_quantity: u64,
        total: Decimal,
    },
    Submitted { order_id: OrderId, shop_name: String, line_count: usize, total_quantity: u64 },
    /// Submission hit a persistence failure; the session is gone and the
    /// user is asked to retry from the start.
    SubmitFailed,
    Cancelled,
    /// A terminal precondition failure ended the session.
    Aborted { cause: PreconditionUnmet },
    NoActiveOrder,
    /// Nothing to say; the dispatcher sends no message.
    Ignored,
    StatusList { agent_name: String, orders: Vec<OrderSummary> },
    NoOrders { agent_name: String },
    UpdatePicker { orders: Vec<OrderSummary> },
    NoPendingOrders,
    OrderUpdated { id: OrderId, status: OrderStatus },
    OrderDeleted { id: OrderId },
    OrderMissing { id: OrderId },
}
