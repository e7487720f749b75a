use async_trait::async_trait;

use orderkato_core::errors::WorkflowError;
use orderkato_core::reply::Reply;

use crate::render::{self, OutboundMessage};

/// Slash commands the bot answers. Anything else starting with `/` becomes
/// `Unknown` and earns a pointer at `/help`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Order,
    Status,
    Update,
    Cancel,
    Unknown { verb: String },
}

/// Parses a message text as a command. Returns `None` for plain text, which
/// the dispatcher routes to free-form quantity input instead. A trailing
/// `@botname` mention (group-chat form) is stripped before matching.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let verb = trimmed.split_whitespace().next().unwrap_or(trimmed);
    let verb = verb.split('@').next().unwrap_or(verb).to_ascii_lowercase();
    Some(match verb.as_str() {
        "/start" => BotCommand::Start,
        "/help" => BotCommand::Help,
        "/order" => BotCommand::Order,
        "/status" => BotCommand::Status,
        "/update" => BotCommand::Update,
        "/cancel" => BotCommand::Cancel,
        _ => BotCommand::Unknown { verb },
    })
}

/// The workflow surface the command router needs. Implemented by the order
/// workflow in production and by fixtures in tests.
#[async_trait]
pub trait OrderCommandService: Send + Sync {
    async fn start_order(&self, handle: &str) -> Result<Reply, WorkflowError>;
    async fn status(&self, handle: &str) -> Result<Reply, WorkflowError>;
    async fn update_menu(&self, handle: &str) -> Result<Reply, WorkflowError>;
    async fn cancel(&self, handle: &str) -> Reply;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: OrderCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        command: BotCommand,
        handle: &str,
    ) -> Result<Option<OutboundMessage>, WorkflowError> {
        let reply = match command {
            BotCommand::Start => return Ok(Some(render::welcome_message())),
            BotCommand::Help => return Ok(Some(render::help_message())),
            BotCommand::Unknown { verb } => return Ok(Some(render::unknown_command(&verb))),
            BotCommand::Order => self.service.start_order(handle).await?,
            BotCommand::Status => self.service.status(handle).await?,
            BotCommand::Update => self.service.update_menu(handle).await?,
            BotCommand::Cancel => self.service.cancel(handle).await,
        };
        Ok(render::render_reply(&reply))
    }
}
