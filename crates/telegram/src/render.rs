use std::fmt::Write as _;

use orderkato_core::domain::{OrderStatus, OrderSummary};
use orderkato_core::flow::{BackTarget, CartAction};
use orderkato_core::reply::Reply;
use orderkato_core::verify::VerificationFailure;

use crate::keyboard::{InlineButton, InlineKeyboard, KeyboardBuilder};
use crate::tokens::{CallbackToken, UpdateAction};

/// Quick-pick quantities offered as buttons. Larger amounts go through
/// free-form text input.
const QUANTITY_PICKS: [u32; 5] = [1, 2, 3, 5, 10];

/// Orders shown in a `/status` listing before it is elided.
const STATUS_DISPLAY_CAP: usize = 10;

/// A fully rendered message, ready for `sendMessage`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl OutboundMessage {
    fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }

    fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self { text: text.into(), keyboard: Some(keyboard) }
    }
}

pub fn welcome_message() -> OutboundMessage {
    OutboundMessage::text_only(
        "Welcome to Orderkato. Use /order to place a shop order, /status to \
         review your recent orders, /update to maintain pending ones, and \
         /help for the full command list.",
    )
}

pub fn help_message() -> OutboundMessage {
    OutboundMessage::text_only(
        "Commands:\n\
         /order - start a new shop order\n\
         /status - your recent orders and their statuses\n\
         /update - mark a pending order delivered or remove it\n\
         /cancel - abandon the order you are composing\n\
         /help - this message",
    )
}

pub fn unknown_command(verb: &str) -> OutboundMessage {
    OutboundMessage::text_only(format!("Unsupported command `{verb}`. Try /help."))
}

/// Sent when a storage or transport failure escapes the workflow. The cause
/// goes to the log; the user gets a generic retry hint.
pub fn failure_notice() -> OutboundMessage {
    OutboundMessage::text_only(
        "Something went wrong on our side and your request was not processed. \
         Try again in a moment; if it keeps failing, contact your coordinator.",
    )
}

/// Turns a workflow reply into an outbound message. `Ignored` renders to
/// nothing and the dispatcher sends nothing.
pub fn render_reply(reply: &Reply) -> Option<OutboundMessage> {
    let message = match reply {
        Reply::Ignored => return None,
        Reply::RegistrationRequired { handle } => OutboundMessage::text_only(format!(
            "@{handle} is not registered for ordering. Ask your coordinator \
             to add your handle, then try again.",
        )),
        Reply::AreaMenu { areas } => OutboundMessage::with_keyboard(
            "Where are you ordering for? Pick an area:",
            KeyboardBuilder::new()
                .stacked(areas, |area| {
                    InlineButton::new(area.name.clone(), CallbackToken::Area(area.id))
                })
                .row(cancel_row)
                .build(),
        ),
        Reply::ShopMenu { area, shops } => OutboundMessage::with_keyboard(
            format!("Shops in {}:", area.name),
            KeyboardBuilder::new()
                .stacked(shops, |shop| {
                    InlineButton::new(shop.button_label(), CallbackToken::Shop(shop.id))
                })
                .row(|row| {
                    row.button("⬅ Areas", CallbackToken::Back(BackTarget::Areas));
                    cancel_row(row);
                })
                .build(),
        ),
        Reply::PhotoPrompt { shop, max_age_secs } => OutboundMessage::with_keyboard(
            format!(
                "Prove you are at {}: send a photo taken within the last {} \
                 seconds, attached as a file so its metadata survives.",
                shop.name, max_age_secs,
            ),
            KeyboardBuilder::new()
                .row(|row| {
                    row.button("⬅ Shops", CallbackToken::Back(BackTarget::Shops));
                    cancel_row(row);
                })
                .build(),
        ),
        Reply::PhotoRejected { failure, max_age_secs } => {
            OutboundMessage::text_only(photo_rejection_text(failure, *max_age_secs))
        }
        Reply::ProductMenu { shop, products, cart_total, verified } => {
            let mut text = String::new();
            if let Some(photo) = verified {
                let _ = writeln!(
                    text,
                    "Photo verified: taken {} ({}s ago).",
                    photo.taken_at.format("%H:%M:%S"),
                    photo.age_secs,
                );
            }
            let _ = write!(text, "Ordering for {}. Pick a product", shop.name);
            if *cart_total > 0 {
                let _ = write!(text, " ({cart_total} item(s) in the cart)");
            }
            text.push(':');

            let mut keyboard = KeyboardBuilder::new().stacked(products, |entry| {
                let mut label =
                    format!("{} - {}", entry.product.name, entry.product.unit_price);
                if entry.in_cart > 0 {
                    let _ = write!(label, " [x{}]", entry.in_cart);
                }
                InlineButton::new(label, CallbackToken::Product(entry.product.id))
            });
            if *cart_total > 0 {
                keyboard = keyboard.row(|row| {
                    row.button("✔ Confirm order", CallbackToken::Action(CartAction::Confirm));
                    row.button("🗑 Clear cart", CallbackToken::Action(CartAction::Clear));
                });
            }
            let keyboard = keyboard
                .row(|row| {
                    row.button("⬅ Shops", CallbackToken::Back(BackTarget::Shops));
                    cancel_row(row);
                })
                .build();
            OutboundMessage::with_keyboard(text, keyboard)
        }
        Reply::QuantityPrompt { product, in_cart } => {
            let mut text = format!(
                "How many of {} ({} each)? Tap a quantity or type a number.",
                product.name, product.unit_price,
            );
            if *in_cart > 0 {
                let _ = write!(text, " Currently in cart: {in_cart}.");
            }
            let keyboard = KeyboardBuilder::new()
                .row(|row| {
                    for pick in QUANTITY_PICKS {
                        row.button(pick.to_string(), CallbackToken::Quantity(pick));
                    }
                })
                .row(|row| {
                    if *in_cart > 0 {
                        row.button("Remove from cart", CallbackToken::Quantity(0));
                    }
                    row.button("⬅ Products", CallbackToken::Back(BackTarget::Products));
                })
                .build();
            OutboundMessage::with_keyboard(text, keyboard)
        }
        Reply::Rejected { error } => {
            OutboundMessage::text_only(format!("{error}. Please try again."))
        }
        Reply::Confirmation { area_name, shop_name, lines, total_quantity, total } => {
            let mut text = format!("Order for {shop_name} ({area_name}):\n");
            for line in lines {
                let _ = write!(text, "• {} x{} @ {}", line.product_name, line.quantity, line.unit_price);
                if !line.discount_pct.is_zero() {
                    let _ = write!(text, " (-{}%)", line.discount_pct);
                }
                let _ = writeln!(text, " = {}", line.line_total);
            }
            let _ = write!(text, "Total: {total_quantity} item(s), {total}.");
            // The confirm screen offers exactly submit, edit and cancel.
            // Cart edits happen back on the product grid.
            OutboundMessage::with_keyboard(
                text,
                KeyboardBuilder::new()
                    .row(|row| {
                        row.button("📤 Submit", CallbackToken::Action(CartAction::Submit));
                    })
                    .row(|row| {
                        row.button("⬅ Products", CallbackToken::Back(BackTarget::Products));
                        cancel_row(row);
                    })
                    .build(),
            )
        }
        Reply::Submitted { order_id, shop_name, line_count, total_quantity } => {
            OutboundMessage::text_only(format!(
                "Order {order_id} submitted for {shop_name}: {line_count} \
                 product(s), {total_quantity} item(s). Track it with /status.",
            ))
        }
        Reply::SubmitFailed => OutboundMessage::text_only(
            "The order could not be saved. Nothing was recorded; please start \
             again with /order.",
        ),
        Reply::Cancelled => OutboundMessage::text_only("Order cancelled."),
        Reply::Aborted { cause } => {
            OutboundMessage::text_only(format!("{cause}. The order was abandoned."))
        }
        Reply::NoActiveOrder => {
            OutboundMessage::text_only("No order in progress. Start one with /order.")
        }
        Reply::StatusList { agent_name, orders } => {
            OutboundMessage::text_only(status_listing(agent_name, orders))
        }
        Reply::NoOrders { agent_name } => OutboundMessage::text_only(format!(
            "No orders on record for {agent_name}. Place one with /order.",
        )),
        Reply::UpdatePicker { orders } => {
            let mut keyboard = KeyboardBuilder::new();
            for order in orders {
                let id = order.id;
                let label = format!("{} · {}", id, order.shop_name);
                keyboard = keyboard.row(|row| {
                    row.button(label, CallbackToken::Update(UpdateAction::Info, id));
                    row.button("✅", CallbackToken::Update(UpdateAction::Delivered, id));
                    row.button("🗑", CallbackToken::Update(UpdateAction::Cancel, id));
                });
            }
            OutboundMessage::with_keyboard("Pending orders. Pick an action:", keyboard.build())
        }
        Reply::NoPendingOrders => {
            OutboundMessage::text_only("No pending orders to update.")
        }
        Reply::OrderUpdated { id, status } => OutboundMessage::text_only(format!(
            "Order {id} is now {}.",
            status.as_str(),
        )),
        Reply::OrderDeleted { id } => {
            OutboundMessage::text_only(format!("Order {id} was removed."))
        }
        Reply::OrderMissing { id } => OutboundMessage::text_only(format!(
            "Order {id} no longer exists; it may have been removed already.",
        )),
    };
    Some(message)
}

/// Details for a single pending order in the `/update` flow: the summary
/// plus its action buttons.
pub fn order_actions(order: &OrderSummary) -> OutboundMessage {
    let mut text = format!(
        "{} {} · {} ({})\nPlaced {}\n",
        status_icon(&order.status),
        order.id,
        order.shop_name,
        order.area_name,
        order.placed_at.format("%Y-%m-%d %H:%M"),
    );
    for item in &order.items {
        let _ = writeln!(text, "• {} x{}", item.product_name, item.quantity);
    }
    OutboundMessage::with_keyboard(
        text,
        KeyboardBuilder::new()
            .row(|row| {
                row.button(
                    "✅ Mark delivered",
                    CallbackToken::Update(UpdateAction::Delivered, order.id),
                );
                row.button("🗑 Remove", CallbackToken::Update(UpdateAction::Cancel, order.id));
            })
            .build(),
    )
}

fn photo_rejection_text(failure: &VerificationFailure, max_age_secs: i64) -> String {
    match failure {
        VerificationFailure::WrongTransportMode => {
            "That photo arrived compressed, which strips its metadata. Send \
             it again as a file attachment."
                .to_owned()
        }
        VerificationFailure::NoTimestampMetadata => {
            "The photo carries no capture timestamp. Take a fresh photo with \
             the camera app and send it as a file."
                .to_owned()
        }
        VerificationFailure::PhotoTooOld { age_secs } => format!(
            "That photo is {age_secs}s old; only photos taken within the \
             last {max_age_secs}s count. Take a new one and resend it.",
        ),
    }
}

fn status_listing(agent_name: &str, orders: &[OrderSummary]) -> String {
    let mut text = format!("Recent orders for {agent_name}:\n");
    for order in orders.iter().take(STATUS_DISPLAY_CAP) {
        let _ = write!(
            text,
            "{} {} · {} ({}) · {}",
            status_icon(&order.status),
            order.id,
            order.shop_name,
            order.area_name,
            order.placed_at.format("%Y-%m-%d"),
        );
        let items = order
            .items
            .iter()
            .map(|item| format!("{} x{}", item.product_name, item.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        if items.is_empty() {
            text.push('\n');
        } else {
            let _ = writeln!(text, "\n    {items}");
        }
    }
    if orders.len() > STATUS_DISPLAY_CAP {
        let _ = write!(text, "…and {} more.", orders.len() - STATUS_DISPLAY_CAP);
    }
    text
}

fn status_icon(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "⏳",
        OrderStatus::Delivered => "✅",
        OrderStatus::UnderDelivered => "⚠️",
        OrderStatus::OverDelivered => "➕",
        OrderStatus::Cancelled => "🚫",
        OrderStatus::Other(_) => "▫️",
    }
}

fn cancel_row(row: &mut crate::keyboard::RowBuilder) {
    row.button("✖ Cancel", CallbackToken::Action(CartAction::Cancel));
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use orderkato_core::domain::{
        Area, AreaId, OrderId, OrderStatus, OrderSummary, Product, ProductId, Shop, ShopId,
        SummaryItem,
    };
    use orderkato_core::errors::UserInputError;
    use orderkato_core::reply::{MenuProduct, PricedLine, Reply};
    use orderkato_core::verify::{VerificationFailure, VerifiedPhoto};

    use super::render_reply;

    fn shop() -> Shop {
        Shop {
            id: ShopId(10),
            name: "Shop A".to_owned(),
            address: Some("1 Long Street".to_owned()),
            area_id: AreaId(1),
        }
    }

    fn product() -> Product {
        Product {
            id: ProductId(100),
            name: "Widget".to_owned(),
            unit_price: Decimal::new(1000, 2),
            discount_pct: Decimal::ZERO,
            brand: "Acme".to_owned(),
        }
    }

    fn summary(id: i64, status: OrderStatus) -> OrderSummary {
        OrderSummary {
            id: OrderId(id),
            placed_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("timestamp"),
            status,
            shop_name: "Shop A".to_owned(),
            area_name: "North".to_owned(),
            items: vec![SummaryItem { product_name: "Widget".to_owned(), quantity: 5 }],
        }
    }

    #[test]
    fn area_menu_carries_one_button_per_area_plus_cancel() {
        let reply = Reply::AreaMenu {
            areas: vec![
                Area { id: AreaId(1), name: "North".to_owned() },
                Area { id: AreaId(2), name: "South".to_owned() },
            ],
        };
        let message = render_reply(&reply).expect("message");
        let keyboard = message.keyboard.expect("keyboard");
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "area:1");
        assert_eq!(keyboard.inline_keyboard[2][0].callback_data, "action:cancel");
    }

    #[test]
    fn product_menu_badges_cart_contents_and_shows_actions_only_with_items() {
        let empty = Reply::ProductMenu {
            shop: shop(),
            products: vec![MenuProduct { product: product(), in_cart: 0 }],
            cart_total: 0,
            verified: None,
        };
        let message = render_reply(&empty).expect("message");
        let keyboard = message.keyboard.expect("keyboard");
        assert!(!keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .any(|button| button.callback_data == "action:confirm"));

        let loaded = Reply::ProductMenu {
            shop: shop(),
            products: vec![MenuProduct { product: product(), in_cart: 3 }],
            cart_total: 3,
            verified: None,
        };
        let message = render_reply(&loaded).expect("message");
        let keyboard = message.keyboard.expect("keyboard");
        assert!(keyboard.inline_keyboard[0][0].text.contains("[x3]"));
        assert!(keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .any(|button| button.callback_data == "action:confirm"));
    }

    #[test]
    fn verified_banner_names_capture_time_and_age() {
        let reply = Reply::ProductMenu {
            shop: shop(),
            products: vec![],
            cart_total: 0,
            verified: Some(VerifiedPhoto {
                taken_at: NaiveDate::from_ymd_opt(2024, 5, 1)
                    .and_then(|date| date.and_hms_opt(9, 30, 12))
                    .expect("timestamp"),
                age_secs: 42,
            }),
        };
        let message = render_reply(&reply).expect("message");
        assert!(message.text.contains("09:30:12"));
        assert!(message.text.contains("42s"));
    }

    #[test]
    fn every_rejection_gets_a_corrective_text() {
        for failure in [
            VerificationFailure::WrongTransportMode,
            VerificationFailure::NoTimestampMetadata,
            VerificationFailure::PhotoTooOld { age_secs: 300 },
        ] {
            let message = render_reply(&Reply::PhotoRejected { failure, max_age_secs: 60 })
                .expect("message");
            assert!(message.text.contains("photo") || message.text.contains("Photo"));
            assert!(message.keyboard.is_none());
        }

        let message = render_reply(&Reply::Rejected {
            error: UserInputError::InvalidQuantity { input: "many".to_owned() },
        })
        .expect("message");
        assert!(message.text.contains("many"));
    }

    #[test]
    fn confirmation_lists_discounted_lines_and_totals() {
        let reply = Reply::Confirmation {
            area_name: "North".to_owned(),
            shop_name: "Shop A".to_owned(),
            lines: vec![PricedLine {
                product_name: "Gadget".to_owned(),
                quantity: 2,
                unit_price: Decimal::new(2500, 2),
                discount_pct: Decimal::new(10, 0),
                line_total: Decimal::new(4500, 2),
            }],
            total_quantity: 2,
            total: Decimal::new(4500, 2),
        };
        let message = render_reply(&reply).expect("message");
        assert!(message.text.contains("Gadget x2"));
        assert!(message.text.contains("-10%"));
        assert!(message.text.contains("45.00"));
        let keyboard = message.keyboard.expect("keyboard");
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "action:submit");
    }

    #[test]
    fn confirmation_offers_only_submit_edit_and_cancel() {
        let reply = Reply::Confirmation {
            area_name: "North".to_owned(),
            shop_name: "Shop A".to_owned(),
            lines: vec![],
            total_quantity: 1,
            total: Decimal::new(1000, 2),
        };
        let message = render_reply(&reply).expect("message");
        let keyboard = message.keyboard.expect("keyboard");
        let tokens: Vec<_> = keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .map(|button| button.callback_data.as_str())
            .collect();
        // Every offered action must have a transition out of the confirm
        // step; cart clearing lives on the product grid only.
        assert_eq!(tokens, vec!["action:submit", "back:products", "action:cancel"]);
    }

    #[test]
    fn status_listing_caps_what_it_shows() {
        let orders = (1..=12).map(|n| summary(n, OrderStatus::Pending)).collect();
        let message = render_reply(&Reply::StatusList {
            agent_name: "Nika".to_owned(),
            orders,
        })
        .expect("message");
        assert!(message.text.contains("ord1 "));
        assert!(message.text.contains("ord10 "));
        assert!(!message.text.contains("ord11 "));
        assert!(message.text.contains("and 2 more"));
    }

    #[test]
    fn status_icons_distinguish_delivery_states() {
        let delivered = render_reply(&Reply::StatusList {
            agent_name: "Nika".to_owned(),
            orders: vec![summary(1, OrderStatus::Delivered)],
        })
        .expect("message");
        let pending = render_reply(&Reply::StatusList {
            agent_name: "Nika".to_owned(),
            orders: vec![summary(1, OrderStatus::Pending)],
        })
        .expect("message");
        assert_ne!(delivered.text, pending.text);
        assert!(delivered.text.contains('✅'));
        assert!(pending.text.contains('⏳'));
    }

    #[test]
    fn update_picker_offers_per_order_tokens() {
        let message = render_reply(&Reply::UpdatePicker {
            orders: vec![summary(4, OrderStatus::Pending)],
        })
        .expect("message");
        let keyboard = message.keyboard.expect("keyboard");
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "upd:info:4");
        assert!(keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .any(|button| button.callback_data == "upd:delivered:4"));
    }

    #[test]
    fn ignored_renders_to_nothing() {
        assert!(render_reply(&Reply::Ignored).is_none());
    }

    #[test]
    fn failure_notice_stays_generic_and_names_a_contact() {
        let message = super::failure_notice();
        assert!(message.text.contains("contact"));
        assert!(message.text.contains("again"));
        // The cause stays in the logs; the text never carries error detail.
        assert!(!message.text.contains("error"));
        assert!(message.keyboard.is_none());
    }
}
