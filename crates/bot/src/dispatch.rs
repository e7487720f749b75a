use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use orderkato_core::errors::WorkflowError;
use orderkato_core::reply::Reply;
use orderkato_core::workflow::{OrderWorkflow, PhotoUpload};
use orderkato_telegram::api::{CallbackQuery, Message, Update};
use orderkato_telegram::commands::{parse_command, CommandRouter, OrderCommandService};
use orderkato_telegram::render::{self, OutboundMessage};
use orderkato_telegram::tokens::{CallbackToken, UpdateAction};
use orderkato_telegram::{BotApi, UpdateHandler};

/// Adapts the workflow to the command router's service trait.
struct WorkflowService(Arc<OrderWorkflow>);

#[async_trait]
impl OrderCommandService for WorkflowService {
    async fn start_order(&self, handle: &str) -> Result<Reply, WorkflowError> {
        self.0.start_order(handle).await
    }

    async fn status(&self, handle: &str) -> Result<Reply, WorkflowError> {
        self.0.status(handle).await
    }

    async fn update_menu(&self, handle: &str) -> Result<Reply, WorkflowError> {
        self.0.update_menu(handle).await
    }

    async fn cancel(&self, handle: &str) -> Reply {
        self.0.cancel(handle).await
    }
}

/// Routes every incoming update to the workflow and sends the rendered reply.
/// Each update runs in its own task so one slow chat never blocks the poll
/// loop or other chats.
pub struct Dispatcher {
    workflow: Arc<OrderWorkflow>,
    api: Arc<BotApi>,
}

impl Dispatcher {
    pub fn new(workflow: Arc<OrderWorkflow>, api: Arc<BotApi>) -> Self {
        Self { workflow, api }
    }

    async fn process(workflow: Arc<OrderWorkflow>, api: Arc<BotApi>, update: Update) {
        let update_id = update.update_id;
        let origin = origin_chat(&update);
        let result = if let Some(message) = update.message {
            Self::process_message(&workflow, &api, message).await
        } else if let Some(query) = update.callback_query {
            Self::process_callback(&workflow, &api, query).await
        } else {
            Ok(())
        };
        if let Err(cause) = result {
            error!(event_name = "dispatch.failed", update_id, %cause, "update handling failed");
            // The detail stays in the log; the chat gets a generic notice so
            // the failure is never silent.
            let Some(chat_id) = origin else { return };
            if let Err(send_cause) = api.send_message(chat_id, &render::failure_notice()).await {
                warn!(
                    event_name = "dispatch.notice_failed",
                    update_id,
                    %send_cause,
                    "failure notice not delivered"
                );
            }
        }
    }

    async fn process_message(
        workflow: &Arc<OrderWorkflow>,
        api: &BotApi,
        message: Message,
    ) -> anyhow::Result<()> {
        let chat_id = message.chat.id;
        let Some(handle) = sender_handle(&message) else {
            api.send_message(
                chat_id,
                &OutboundMessage {
                    text: "Set a Telegram username first; registration is keyed on it."
                        .to_owned(),
                    keyboard: None,
                },
            )
            .await?;
            return Ok(());
        };

        let outbound = if let Some(document) = message.document {
            let bytes = api.download_file(&document.file_id).await?;
            let reply = workflow.handle_photo(&handle, PhotoUpload::Document(bytes)).await?;
            render::render_reply(&reply)
        } else if message.photo.is_some() {
            // Compressed uploads lose their metadata in transit; the workflow
            // rejects them without a download.
            let reply = workflow.handle_photo(&handle, PhotoUpload::Compressed).await?;
            render::render_reply(&reply)
        } else if let Some(text) = message.text {
            match parse_command(&text) {
                Some(command) => {
                    let router = CommandRouter::new(WorkflowService(workflow.clone()));
                    router.route(command, &handle).await?
                }
                None => {
                    let reply = workflow.handle_quantity_text(&handle, &text).await?;
                    render::render_reply(&reply)
                }
            }
        } else {
            None
        };

        if let Some(outbound) = outbound {
            api.send_message(chat_id, &outbound).await?;
        }
        Ok(())
    }

    async fn process_callback(
        workflow: &OrderWorkflow,
        api: &BotApi,
        query: CallbackQuery,
    ) -> anyhow::Result<()> {
        if let Err(cause) = api.answer_callback(&query.id).await {
            // Cosmetic only: an unanswered callback leaves a spinner.
            warn!(event_name = "dispatch.answer_failed", %cause, "callback ack failed");
        }

        let handle = query.from.username.map(|name| name.to_ascii_lowercase());
        let Some(handle) = handle else {
            return Ok(());
        };
        let chat_id = query.from.id;

        let reply = match CallbackToken::parse(query.data.as_deref().unwrap_or_default()) {
            Err(parse_error) => {
                info!(event_name = "dispatch.bad_token", handle, %parse_error, "stale button");
                Reply::Rejected {
                    error: orderkato_core::errors::UserInputError::UnrecognizedToken {
                        token: query.data.unwrap_or_default(),
                    },
                }
            }
            Ok(token) => match token.flow_event() {
                Some(event) => workflow.handle_event(&handle, event).await?,
                None => match token {
                    CallbackToken::Update(UpdateAction::Delivered, id) => {
                        workflow.mark_delivered(id).await?
                    }
                    CallbackToken::Update(UpdateAction::Cancel, id) => {
                        workflow.cancel_order(id).await?
                    }
                    CallbackToken::Update(UpdateAction::Info, id) => {
                        // The picker is the source of truth; look the order up
                        // in a fresh listing rather than trusting the button.
                        match workflow.update_menu(&handle).await? {
                            Reply::UpdatePicker { orders } => {
                                match orders.into_iter().find(|order| order.id == id) {
                                    Some(order) => {
                                        let details = render::order_actions(&order);
                                        api.send_message(chat_id, &details).await?;
                                        return Ok(());
                                    }
                                    None => Reply::OrderMissing { id },
                                }
                            }
                            other => other,
                        }
                    }
                    _ => Reply::Ignored,
                },
            },
        };

        if let Some(outbound) = render::render_reply(&reply) {
            match &query.message {
                Some(origin) => {
                    api.edit_message_text(origin.chat.id, origin.message_id, &outbound).await?
                }
                None => api.send_message(chat_id, &outbound).await?,
            }
        }
        Ok(())
    }
}

/// Where a failure notice for this update should go: the message's chat, or
/// for a button press the chat holding the pressed keyboard, falling back to
/// the presser's private chat.
fn origin_chat(update: &Update) -> Option<i64> {
    if let Some(message) = &update.message {
        return Some(message.chat.id);
    }
    update.callback_query.as_ref().map(|query| {
        query.message.as_ref().map(|origin| origin.chat.id).unwrap_or(query.from.id)
    })
}

/// The registry keys sessions on the lowercased Telegram username.
fn sender_handle(message: &Message) -> Option<String> {
    message
        .from
        .as_ref()
        .and_then(|user| user.username.as_deref())
        .map(|name| name.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use orderkato_telegram::api::{CallbackQuery, Chat, Message, Update, User};

    use super::{origin_chat, sender_handle};

    fn message(from: Option<User>) -> Message {
        Message { message_id: 1, from, chat: Chat { id: 9 }, text: None, photo: None, document: None }
    }

    #[test]
    fn handles_are_lowercased() {
        let from = User { id: 5, username: Some("NiKa".to_owned()), first_name: "Nika".to_owned() };
        assert_eq!(sender_handle(&message(Some(from))).as_deref(), Some("nika"));
    }

    #[test]
    fn missing_usernames_yield_no_handle() {
        let from = User { id: 5, username: None, first_name: "Nika".to_owned() };
        assert_eq!(sender_handle(&message(Some(from))), None);
        assert_eq!(sender_handle(&message(None)), None);
    }

    #[test]
    fn failure_notices_target_the_originating_chat() {
        let from_message = Update {
            update_id: 1,
            message: Some(message(None)),
            callback_query: None,
        };
        assert_eq!(origin_chat(&from_message), Some(9));

        let from_button = Update {
            update_id: 2,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb".to_owned(),
                from: User { id: 5, username: None, first_name: "Nika".to_owned() },
                message: Some(message(None)),
                data: Some("area:1".to_owned()),
            }),
        };
        assert_eq!(origin_chat(&from_button), Some(9));

        let detached_button = Update {
            update_id: 3,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb".to_owned(),
                from: User { id: 5, username: None, first_name: "Nika".to_owned() },
                message: None,
                data: None,
            }),
        };
        assert_eq!(origin_chat(&detached_button), Some(5));
    }
}

#[async_trait]
impl UpdateHandler for Dispatcher {
    async fn handle(&self, update: Update) -> anyhow::Result<()> {
        let workflow = self.workflow.clone();
        let api = self.api.clone();
        tokio::spawn(Self::process(workflow, api, update));
        Ok(())
    }
}
