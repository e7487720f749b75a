//! Telegram boundary for orderkato.
//!
//! This crate owns everything Telegram-shaped:
//! - **Callback tokens** (`tokens`) - the `area:`/`shop:`/`qty:`/`upd:` button grammar
//! - **Commands** (`commands`) - `/order`, `/status`, `/update`, `/cancel` parsing and routing
//! - **Keyboards** (`keyboard`) - typed inline-keyboard builders
//! - **Rendering** (`render`) - workflow replies turned into outbound messages
//! - **Transport** (`api`, `poller`) - Bot API client and the long-poll loop
//!
//! The workflow itself never sees Telegram: it consumes parsed events and
//! produces transport-neutral replies, and this crate translates both ways.
//!
//! # Key Types
//!
//! - `CallbackToken` - every button press, parsed or rejected as a typed error
//! - `OutboundMessage` - text plus optional inline keyboard, ready to send
//! - `UpdatePoller` - `getUpdates` loop with reconnect/backoff
//! - `OrderCommandService` - trait the command router drives

pub mod api;
pub mod commands;
pub mod keyboard;
pub mod poller;
pub mod render;
pub mod tokens;

pub use api::{BotApi, Update};
pub use commands::{parse_command, BotCommand, CommandRouter, OrderCommandService};
pub use keyboard::{InlineButton, InlineKeyboard, KeyboardBuilder};
pub use poller::{Polled, ReconnectPolicy, TransportError, UpdateHandler, UpdatePoller, UpdateTransport};
pub use render::{render_reply, OutboundMessage};
pub use tokens::{CallbackToken, TokenParseError, UpdateAction};
