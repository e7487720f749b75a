use thiserror::Error;

use orderkato_core::domain::{AreaId, OrderId, ProductId, ShopId};
use orderkato_core::flow::{BackTarget, CartAction, FlowEvent};

/// Operations offered on a pending order from the `/update` picker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateAction {
    /// Re-render the order's details.
    Info,
    /// Mark the order Delivered.
    Delivered,
    /// Delete the order.
    Cancel,
}

impl UpdateAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Delivered => "delivered",
            Self::Cancel => "cancel",
        }
    }
}

/// Every callback button in the bot carries one of these, encoded as
/// `family:payload`. The grammar is closed: anything that does not parse is a
/// stale or foreign button, never a crash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackToken {
    Area(AreaId),
    Shop(ShopId),
    Product(ProductId),
    Quantity(u32),
    Action(CartAction),
    Back(BackTarget),
    Update(UpdateAction, OrderId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("callback data `{0}` does not match any known token family")]
    UnknownFamily(String),
    #[error("callback data `{0}` has a malformed payload")]
    MalformedPayload(String),
}

impl CallbackToken {
    pub fn encode(&self) -> String {
        match self {
            Self::Area(id) => format!("area:{}", id.0),
            Self::Shop(id) => format!("shop:{}", id.0),
            Self::Product(id) => format!("product:{}", id.0),
            Self::Quantity(n) => format!("qty:{n}"),
            Self::Action(action) => {
                let verb = match action {
                    CartAction::Confirm => "confirm",
                    CartAction::Clear => "clear",
                    CartAction::Submit => "submit",
                    CartAction::Cancel => "cancel",
                };
                format!("action:{verb}")
            }
            Self::Back(target) => {
                let step = match target {
                    BackTarget::Areas => "areas",
                    BackTarget::Shops => "shops",
                    BackTarget::Products => "products",
                };
                format!("back:{step}")
            }
            Self::Update(action, id) => format!("upd:{}:{}", action.as_str(), id.0),
        }
    }

    pub fn parse(data: &str) -> Result<Self, TokenParseError> {
        let malformed = || TokenParseError::MalformedPayload(data.to_owned());
        let (family, payload) =
            data.split_once(':').ok_or_else(|| TokenParseError::UnknownFamily(data.to_owned()))?;

        match family {
            "area" => Ok(Self::Area(AreaId(payload.parse().map_err(|_| malformed())?))),
            "shop" => Ok(Self::Shop(ShopId(payload.parse().map_err(|_| malformed())?))),
            "product" => Ok(Self::Product(ProductId(payload.parse().map_err(|_| malformed())?))),
            "qty" => Ok(Self::Quantity(payload.parse().map_err(|_| malformed())?)),
            "action" => match payload {
                "confirm" => Ok(Self::Action(CartAction::Confirm)),
                "clear" => Ok(Self::Action(CartAction::Clear)),
                "submit" => Ok(Self::Action(CartAction::Submit)),
                "cancel" => Ok(Self::Action(CartAction::Cancel)),
                _ => Err(malformed()),
            },
            "back" => match payload {
                "areas" => Ok(Self::Back(BackTarget::Areas)),
                "shops" => Ok(Self::Back(BackTarget::Shops)),
                "products" => Ok(Self::Back(BackTarget::Products)),
                _ => Err(malformed()),
            },
            "upd" => {
                let (verb, id) = payload.split_once(':').ok_or_else(malformed)?;
                let id = OrderId(id.parse().map_err(|_| malformed())?);
                match verb {
                    "info" => Ok(Self::Update(UpdateAction::Info, id)),
                    "delivered" => Ok(Self::Update(UpdateAction::Delivered, id)),
                    "cancel" => Ok(Self::Update(UpdateAction::Cancel, id)),
                    _ => Err(malformed()),
                }
            }
            _ => Err(TokenParseError::UnknownFamily(data.to_owned())),
        }
    }

    /// The workflow event this token dispatches, when it dispatches one.
    /// The `upd` family drives the order-maintenance path instead and has no
    /// state-machine counterpart.
    pub fn flow_event(&self) -> Option<FlowEvent> {
        match *self {
            Self::Area(id) => Some(FlowEvent::AreaChosen(id)),
            Self::Shop(id) => Some(FlowEvent::ShopChosen(id)),
            Self::Product(id) => Some(FlowEvent::ProductChosen(id)),
            Self::Quantity(n) => Some(FlowEvent::QuantitySet(n)),
            Self::Action(action) => Some(FlowEvent::ActionTaken(action)),
            Self::Back(target) => Some(FlowEvent::BackRequested(target)),
            Self::Update(..) => None,
        }
    }
}
