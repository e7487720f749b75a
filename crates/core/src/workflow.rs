//! The order-taking orchestrator.
//!
//! Sits between the messaging boundary and the pure transition table:
//! resolves selections against the catalog, runs [`transition`], executes the
//! returned [`FlowAction`]s against the storage traits, and produces a
//! transport-neutral [`Reply`]. All session bookkeeping (checkout, put-back,
//! terminal removal) lives here so callers never touch a [`Session`].

use std::sync::Arc;

use chrono::{Local, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::cart::line_total;
use crate::domain::{NewOrder, OrderId, OrderStatus};
use crate::errors::{PreconditionUnmet, UserInputError, WorkflowError};
use crate::evidence::EvidenceStore;
use crate::flow::{
    transition, EndReason, FlowAction, FlowContext, FlowDisposition, FlowEvent, FlowState,
    FlowTransitionError,
};
use crate::reply::{MenuProduct, PricedLine, Reply};
use crate::session::{Session, SessionStore};
use crate::storage::{CatalogReader, IdentityDirectory, OrderStore};
use crate::verify::{FreshnessVerifier, VerificationFailure, VerifiedPhoto};

/// How a photo arrived at the gateway. Only documents preserve metadata;
/// compressed uploads are rejected before any byte is inspected.
#[derive(Clone, Debug)]
pub enum PhotoUpload {
    Document(Vec<u8>),
    Compressed,
}

pub struct OrderWorkflow {
    catalog: Arc<dyn CatalogReader>,
    identities: Arc<dyn IdentityDirectory>,
    orders: Arc<dyn OrderStore>,
    evidence: Arc<dyn EvidenceStore>,
    verifier: FreshnessVerifier,
    sessions: SessionStore,
    photo_gate: bool,
}

impl OrderWorkflow {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        identities: Arc<dyn IdentityDirectory>,
        orders: Arc<dyn OrderStore>,
        evidence: Arc<dyn EvidenceStore>,
        verifier: FreshnessVerifier,
        photo_gate: bool,
    ) -> Self {
        Self {
            catalog,
            identities,
            orders,
            evidence,
            verifier,
            sessions: SessionStore::new(),
            photo_gate,
        }
    }

    /// Session registry, exposed for the idle-expiry sweep.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// `/order`: rejects unregistered handles, then opens a fresh session.
    /// Any in-progress session for the handle is discarded.
    pub async fn start_order(&self, handle: &str) -> Result<Reply, WorkflowError> {
        let Some(agent) = self.identities.find_by_handle(handle).await? else {
            info!(event_name = "order_rejected_unregistered", handle, "unregistered handle");
            return Ok(Reply::RegistrationRequired { handle: handle.to_owned() });
        };

        let areas = self.catalog.list_areas().await?;
        if areas.is_empty() {
            return Ok(Reply::Aborted { cause: PreconditionUnmet::NoAreas });
        }

        info!(event_name = "order_started", handle, agent_id = agent.id.0, "session opened");
        self.sessions.begin(handle, agent).await;
        Ok(Reply::AreaMenu { areas })
    }

    /// A parsed button event for the handle's active session.
    pub async fn handle_event(&self, handle: &str, event: FlowEvent) -> Result<Reply, WorkflowError> {
        let Some(session) = self.sessions.take(handle).await else {
            return Ok(Reply::NoActiveOrder);
        };
        self.drive(handle, session, event, None).await
    }

    /// Free-form text while a product is focused. Anything else is ignored.
    pub async fn handle_quantity_text(
        &self,
        handle: &str,
        text: &str,
    ) -> Result<Reply, WorkflowError> {
        let Some(session) = self.sessions.take(handle).await else {
            return Ok(Reply::Ignored);
        };
        if session.state != FlowState::EnterQuantity {
            self.sessions.put(handle, session).await;
            return Ok(Reply::Ignored);
        }

        let trimmed = text.trim();
        match trimmed.parse::<u32>() {
            Ok(quantity) => self.drive(handle, session, FlowEvent::QuantitySet(quantity), None).await,
            Err(_) => {
                // Overlong digit strings overflow the parse; they still mean
                // "too many", not "not a number".
                let error = if !trimmed.is_empty()
                    && trimmed.chars().all(|c| c.is_ascii_digit())
                {
                    UserInputError::QuantityOutOfRange { quantity: u32::MAX }
                } else {
                    UserInputError::InvalidQuantity { input: trimmed.to_owned() }
                };
                self.sessions.put(handle, session).await;
                Ok(Reply::Rejected { error })
            }
        }
    }

    /// A photo upload. Only meaningful while the session sits at the
    /// verification step; elsewhere the upload is silently ignored.
    pub async fn handle_photo(
        &self,
        handle: &str,
        upload: PhotoUpload,
    ) -> Result<Reply, WorkflowError> {
        let Some(mut session) = self.sessions.take(handle).await else {
            return Ok(Reply::Ignored);
        };
        if session.state != FlowState::VerifyPhoto {
            self.sessions.put(handle, session).await;
            return Ok(Reply::Ignored);
        }

        let max_age_secs = self.verifier.max_age_secs();
        let bytes = match upload {
            PhotoUpload::Compressed => {
                self.sessions.put(handle, session).await;
                return Ok(Reply::PhotoRejected {
                    failure: VerificationFailure::WrongTransportMode,
                    max_age_secs,
                });
            }
            PhotoUpload::Document(bytes) => bytes,
        };

        match self.verifier.verify(&bytes, Local::now().naive_local()) {
            Err(failure) => {
                info!(
                    event_name = "photo_rejected",
                    handle,
                    failure = %failure,
                    "verification photo rejected"
                );
                self.sessions.put(handle, session).await;
                Ok(Reply::PhotoRejected { failure, max_age_secs })
            }
            Ok(verified) => {
                let Some(shop) = session.shop.clone() else {
                    warn!(event_name = "session_corrupt", handle, "photo step without a shop");
                    return Ok(Reply::NoActiveOrder);
                };
                match self.evidence.store(&bytes, shop.id, session.agent.id).await {
                    Err(err) => {
                        // Evidence write failures are retryable: the session
                        // stays at the photo step and the user resends.
                        error!(
                            event_name = "evidence_store_failed",
                            handle,
                            error = %err,
                            "could not persist verification photo"
                        );
                        self.sessions.put(handle, session).await;
                        Err(err.into())
                    }
                    Ok(evidence) => {
                        info!(
                            event_name = "photo_accepted",
                            handle,
                            age_secs = verified.age_secs,
                            evidence = %evidence.0,
                            "verification photo accepted"
                        );
                        session.evidence = Some(evidence);
                        self.drive(handle, session, FlowEvent::PhotoAccepted, Some(verified)).await
                    }
                }
            }
        }
    }

    /// `/cancel`: drops any active session. Always confirms, even when there
    /// was nothing to cancel.
    pub async fn cancel(&self, handle: &str) -> Reply {
        if self.sessions.remove(handle).await {
            info!(event_name = "order_cancelled", handle, "session cancelled by command");
        }
        Reply::Cancelled
    }

    /// `/status`: the handle's recent orders, newest first.
    pub async fn status(&self, handle: &str) -> Result<Reply, WorkflowError> {
        let Some(agent) = self.identities.find_by_handle(handle).await? else {
            return Ok(Reply::RegistrationRequired { handle: handle.to_owned() });
        };
        let orders = self.orders.list_by_agent(agent.id).await?;
        if orders.is_empty() {
            return Ok(Reply::NoOrders { agent_name: agent.name });
        }
        Ok(Reply::StatusList { agent_name: agent.name, orders })
    }

    /// `/update`: pending orders only, as a pick list for delivery updates.
    pub async fn update_menu(&self, handle: &str) -> Result<Reply, WorkflowError> {
        let Some(agent) = self.identities.find_by_handle(handle).await? else {
            return Ok(Reply::RegistrationRequired { handle: handle.to_owned() });
        };
        let orders: Vec<_> = self
            .orders
            .list_by_agent(agent.id)
            .await?
            .into_iter()
            .filter(|order| order.status.is_pending())
            .collect();
        if orders.is_empty() {
            return Ok(Reply::NoPendingOrders);
        }
        Ok(Reply::UpdatePicker { orders })
    }

    pub async fn mark_delivered(&self, id: OrderId) -> Result<Reply, WorkflowError> {
        if self.orders.update_status(id, OrderStatus::Delivered).await? {
            info!(event_name = "order_delivered", order_id = %id, "order marked delivered");
            Ok(Reply::OrderUpdated { id, status: OrderStatus::Delivered })
        } else {
            Ok(Reply::OrderMissing { id })
        }
    }

    pub async fn cancel_order(&self, id: OrderId) -> Result<Reply, WorkflowError> {
        if self.orders.delete(id).await? {
            info!(event_name = "order_deleted", order_id = %id, "order removed");
            Ok(Reply::OrderDeleted { id })
        } else {
            Ok(Reply::OrderMissing { id })
        }
    }

    /// Resolves the event against the catalog, transitions, executes the
    /// resulting actions, and settles the session (put back, or dropped on a
    /// terminal outcome). Storage errors drop the session: half-resolved
    /// context is worse than asking the user to start over.
    async fn drive(
        &self,
        handle: &str,
        mut session: Session,
        event: FlowEvent,
        mut verified: Option<VerifiedPhoto>,
    ) -> Result<Reply, WorkflowError> {
        // Stale buttons (an entity removed since the menu was rendered) are
        // recoverable: re-prompt in place instead of transitioning.
        match event {
            FlowEvent::AreaChosen(id) => {
                let areas = self.catalog.list_areas().await?;
                match areas.into_iter().find(|area| area.id == id) {
                    Some(area) => session.area = Some(area),
                    None => {
                        let reply = Reply::Rejected {
                            error: UserInputError::UnrecognizedToken {
                                token: format!("area:{}", id.0),
                            },
                        };
                        self.sessions.put(handle, session).await;
                        return Ok(reply);
                    }
                }
            }
            FlowEvent::ShopChosen(id) => {
                let Some(area) = session.area.clone() else {
                    warn!(event_name = "session_corrupt", handle, "shop choice without an area");
                    return Ok(Reply::NoActiveOrder);
                };
                let shops = self.catalog.list_shops(area.id).await?;
                match shops.into_iter().find(|shop| shop.id == id) {
                    Some(shop) => session.shop = Some(shop),
                    None => {
                        let reply = Reply::Rejected {
                            error: UserInputError::UnrecognizedToken {
                                token: format!("shop:{}", id.0),
                            },
                        };
                        self.sessions.put(handle, session).await;
                        return Ok(reply);
                    }
                }
            }
            FlowEvent::ProductChosen(id) => {
                let products = self.catalog.list_products().await?;
                match products.into_iter().find(|product| product.id == id) {
                    Some(product) => session.focused_product = Some(product),
                    None => {
                        let reply = Reply::Rejected {
                            error: UserInputError::UnrecognizedToken {
                                token: format!("product:{}", id.0),
                            },
                        };
                        self.sessions.put(handle, session).await;
                        return Ok(reply);
                    }
                }
            }
            _ => {}
        }

        let context = FlowContext {
            photo_gate: self.photo_gate,
            cart_has_items: !session.cart.is_empty(),
            product_focused: session.focused_product.is_some(),
        };
        let outcome = match transition(session.state, &event, &context) {
            Ok(outcome) => outcome,
            Err(FlowTransitionError::QuantityOutOfRange { quantity }) => {
                self.sessions.put(handle, session).await;
                return Ok(Reply::Rejected {
                    error: UserInputError::QuantityOutOfRange { quantity },
                });
            }
            Err(FlowTransitionError::EmptyCart) => {
                info!(event_name = "order_aborted", handle, cause = "empty_cart", "session ended");
                return Ok(Reply::Aborted { cause: PreconditionUnmet::EmptyCart });
            }
            Err(FlowTransitionError::NoProductFocused) => {
                warn!(event_name = "order_aborted", handle, cause = "focus_lost", "session ended");
                return Ok(Reply::Aborted { cause: PreconditionUnmet::ProductFocusLost });
            }
            Err(FlowTransitionError::InvalidTransition { state, event }) => {
                // Out-of-step button presses (double taps, old messages) are
                // dropped without disturbing the session.
                info!(
                    event_name = "event_out_of_step",
                    handle,
                    state = ?state,
                    event = ?event,
                    "ignoring event the current step does not accept"
                );
                self.sessions.put(handle, session).await;
                return Ok(Reply::Ignored);
            }
        };

        let mut reply = Reply::Ignored;
        for action in &outcome.actions {
            match action {
                FlowAction::LoadAreas => {
                    let areas = self.catalog.list_areas().await?;
                    if areas.is_empty() {
                        return Ok(Reply::Aborted { cause: PreconditionUnmet::NoAreas });
                    }
                    reply = Reply::AreaMenu { areas };
                }
                FlowAction::LoadShops => {
                    let Some(area) = session.area.clone() else {
                        warn!(event_name = "session_corrupt", handle, "shop menu without an area");
                        return Ok(Reply::NoActiveOrder);
                    };
                    let shops = self.catalog.list_shops(area.id).await?;
                    if shops.is_empty() {
                        return Ok(Reply::Aborted {
                            cause: PreconditionUnmet::NoShops { area_name: area.name },
                        });
                    }
                    reply = Reply::ShopMenu { area, shops };
                }
                FlowAction::InitCart => {
                    session.cart.clear();
                    session.focused_product = None;
                    session.evidence = None;
                }
                FlowAction::RequestPhoto => {
                    let Some(shop) = session.shop.clone() else {
                        warn!(event_name = "session_corrupt", handle, "photo prompt without a shop");
                        return Ok(Reply::NoActiveOrder);
                    };
                    reply = Reply::PhotoPrompt { shop, max_age_secs: self.verifier.max_age_secs() };
                }
                FlowAction::ShowProducts => {
                    let Some(shop) = session.shop.clone() else {
                        warn!(event_name = "session_corrupt", handle, "product menu without a shop");
                        return Ok(Reply::NoActiveOrder);
                    };
                    let products = self.catalog.list_products().await?;
                    if products.is_empty() {
                        return Ok(Reply::Aborted { cause: PreconditionUnmet::NoProducts });
                    }
                    let products = products
                        .into_iter()
                        .map(|product| MenuProduct {
                            in_cart: session.cart.quantity(product.id),
                            product,
                        })
                        .collect();
                    reply = Reply::ProductMenu {
                        shop,
                        products,
                        cart_total: session.cart.total_quantity(),
                        verified: verified.take(),
                    };
                }
                FlowAction::PromptQuantity => {
                    let Some(product) = session.focused_product.clone() else {
                        warn!(event_name = "session_corrupt", handle, "quantity prompt unfocused");
                        return Ok(Reply::NoActiveOrder);
                    };
                    reply = Reply::QuantityPrompt {
                        in_cart: session.cart.quantity(product.id),
                        product,
                    };
                }
                FlowAction::ApplyQuantity(quantity) => {
                    if let Some(product) = session.focused_product.take() {
                        session.cart.upsert(product.id, *quantity);
                    }
                }
                FlowAction::ClearCart => {
                    session.cart.clear();
                }
                FlowAction::ShowConfirmation => {
                    reply = self.confirmation(&session).await?;
                }
                FlowAction::PersistOrder => {
                    reply = self.persist(handle, &session).await;
                }
            }
        }

        match outcome.to {
            FlowDisposition::Continue(next) => {
                session.state = next;
                self.sessions.put(handle, session).await;
            }
            FlowDisposition::End(EndReason::Cancelled) => {
                info!(event_name = "order_cancelled", handle, "session cancelled by button");
                reply = Reply::Cancelled;
            }
            // Reply was set by PersistOrder; the session is simply dropped.
            FlowDisposition::End(EndReason::Submitted) => {}
        }
        Ok(reply)
    }

    async fn confirmation(&self, session: &Session) -> Result<Reply, WorkflowError> {
        let products = self.catalog.list_products().await?;
        let mut lines = Vec::with_capacity(session.cart.len());
        let mut total = Decimal::ZERO;
        for (product_id, quantity) in session.cart.entries() {
            let Some(product) = products.iter().find(|product| product.id == product_id) else {
                warn!(
                    event_name = "cart_line_orphaned",
                    product_id = product_id.0,
                    "cart references a product no longer in the catalog"
                );
                continue;
            };
            let line = line_total(product.unit_price, product.discount_pct, quantity);
            total += line;
            lines.push(PricedLine {
                product_name: product.name.clone(),
                quantity,
                unit_price: product.unit_price,
                discount_pct: product.discount_pct,
                line_total: line,
            });
        }
        Ok(Reply::Confirmation {
            area_name: session.area.as_ref().map(|area| area.name.clone()).unwrap_or_default(),
            shop_name: session.shop.as_ref().map(|shop| shop.name.clone()).unwrap_or_default(),
            lines,
            total_quantity: session.cart.total_quantity(),
            total,
        })
    }

    /// Submission is the one action whose storage failure must not bubble:
    /// the user gets an explicit retry message and the cause goes to the log.
    async fn persist(&self, handle: &str, session: &Session) -> Reply {
        let Some(shop) = session.shop.clone() else {
            warn!(event_name = "session_corrupt", handle, "submit without a shop");
            return Reply::NoActiveOrder;
        };
        let order = match NewOrder::new(
            session.agent.id,
            shop.id,
            Utc::now(),
            session.evidence.clone(),
            session.cart.entries(),
        ) {
            Ok(order) => order,
            Err(_) => return Reply::Aborted { cause: PreconditionUnmet::EmptyCart },
        };
        let line_count = order.lines().len();

        match self.orders.submit(order).await {
            Ok(order_id) => {
                info!(
                    event_name = "order_submitted",
                    handle,
                    order_id = %order_id,
                    agent_id = session.agent.id.0,
                    shop_id = shop.id.0,
                    line_count,
                    "order persisted"
                );
                Reply::Submitted {
                    order_id,
                    shop_name: shop.name,
                    line_count,
                    total_quantity: session.cart.total_quantity(),
                }
            }
            Err(err) => {
                error!(
                    event_name = "order_submit_failed",
                    handle,
                    error = %err,
                    "order persistence failed"
                );
                Reply::SubmitFailed
            }
        }
    }
}
