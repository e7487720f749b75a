pub mod cart;
pub mod config;
pub mod domain;
pub mod errors;
pub mod evidence;
pub mod flow;
pub mod reply;
pub mod session;
pub mod storage;
pub mod verify;
pub mod workflow;

pub use cart::{line_total, Cart};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, StorageBackend,
};
pub use domain::{
    Agent, Area, AreaId, NewOrder, Order, OrderId, OrderLine, OrderStatus, OrderSummary,
    OrderValidationError, Product, ProductId, Shop, ShopId, SummaryItem, UserId,
};
pub use errors::{PreconditionUnmet, UserInputError, WorkflowError};
pub use evidence::{EvidenceRef, EvidenceStore, FsEvidenceStore};
pub use flow::{
    BackTarget, CartAction, FlowEvent, FlowState, FlowTransitionError, MAX_QUANTITY,
};
pub use reply::{MenuProduct, PricedLine, Reply};
pub use session::{Session, SessionStore};
pub use storage::{
    CatalogReader, IdentityDirectory, OrderIdAllocator, OrderStore, StorageError,
    LIST_RECENT_LIMIT,
};
pub use verify::{FreshnessVerifier, VerificationFailure, VerifiedPhoto};
pub use workflow::{OrderWorkflow, PhotoUpload};
