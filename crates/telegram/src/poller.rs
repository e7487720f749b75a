use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, BotApi, Update};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to fetch updates: {0}")]
    Receive(String),
}

/// What one poll produced. `Closed` ends the loop cleanly; the production
/// transport never emits it, the scripted test double does.
#[derive(Debug)]
pub enum Polled {
    Batch(Vec<Update>),
    Closed,
}

/// Source of updates, long-poll shaped. `offset` is the next update id the
/// caller has not yet seen; the transport must not return anything older.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn poll(&self, offset: i64) -> Result<Polled, TransportError>;
}

#[async_trait]
impl<T: UpdateTransport + ?Sized> UpdateTransport for std::sync::Arc<T> {
    async fn poll(&self, offset: i64) -> Result<Polled, TransportError> {
        (**self).poll(offset).await
    }
}

#[async_trait]
impl UpdateTransport for BotApi {
    async fn poll(&self, offset: i64) -> Result<Polled, TransportError> {
        match self.get_updates(offset).await {
            Ok(updates) => Ok(Polled::Batch(updates)),
            Err(ApiError::Transport(error)) => Err(TransportError::Receive(error.to_string())),
            Err(ApiError::Rejected(description)) => Err(TransportError::Receive(description)),
        }
    }
}

/// Consumes one update. Errors are logged and the loop moves on; a handler
/// failure must never stall every other chat.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: Update) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5000 }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// The update loop: poll, advance the offset, dispatch, repeat. Consecutive
/// transport failures back off exponentially; once the retry budget is spent
/// the loop ends without tearing the process down, leaving restart policy to
/// the supervisor.
pub struct UpdatePoller<T, H> {
    transport: T,
    handler: H,
    policy: ReconnectPolicy,
}

impl<T, H> UpdatePoller<T, H>
where
    T: UpdateTransport,
    H: UpdateHandler,
{
    pub fn new(transport: T, handler: H, policy: ReconnectPolicy) -> Self {
        Self { transport, handler, policy }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut offset = 0i64;
        let mut consecutive_failures = 0u32;

        loop {
            match self.transport.poll(offset).await {
                Ok(Polled::Closed) => {
                    info!(event_name = "poller.closed", "update transport closed");
                    return Ok(());
                }
                Ok(Polled::Batch(updates)) => {
                    consecutive_failures = 0;
                    if !updates.is_empty() {
                        debug!(
                            event_name = "poller.batch",
                            count = updates.len(),
                            "received updates"
                        );
                    }
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let update_id = update.update_id;
                        if let Err(cause) = self.handler.handle(update).await {
                            error!(
                                event_name = "poller.dispatch_failed",
                                update_id,
                                %cause,
                                "update handler failed; continuing"
                            );
                        }
                    }
                }
                Err(cause) => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.policy.max_retries {
                        warn!(
                            event_name = "poller.gave_up",
                            retries = self.policy.max_retries,
                            %cause,
                            "retry budget exhausted; stopping the poller"
                        );
                        return Ok(());
                    }
                    let delay = self.policy.delay_for(consecutive_failures - 1);
                    warn!(
                        event_name = "poller.retry",
                        attempt = consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        %cause,
                        "transport failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{
        Polled, ReconnectPolicy, TransportError, UpdateHandler, UpdatePoller, UpdateTransport,
    };
    use crate::api::Update;

    fn update(id: i64) -> Update {
        Update { update_id: id, message: None, callback_query: None }
    }

    struct ScriptedState {
        script: VecDeque<Result<Polled, TransportError>>,
        offsets: Vec<i64>,
    }

    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Polled, TransportError>>) -> Self {
            Self { state: Mutex::new(ScriptedState { script: script.into(), offsets: Vec::new() }) }
        }

        fn offsets(&self) -> Vec<i64> {
            self.state.lock().expect("state lock").offsets.clone()
        }
    }

    #[async_trait]
    impl UpdateTransport for &ScriptedTransport {
        async fn poll(&self, offset: i64) -> Result<Polled, TransportError> {
            let mut state = self.state.lock().expect("state lock");
            state.offsets.push(offset);
            state.script.pop_front().unwrap_or(Ok(Polled::Closed))
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        handled: AtomicU32,
        fail_first: bool,
    }

    #[async_trait]
    impl UpdateHandler for &CountingHandler {
        async fn handle(&self, update: Update) -> anyhow::Result<()> {
            let seen = self.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && seen == 0 {
                anyhow::bail!("scripted failure for update {}", update.update_id);
            }
            Ok(())
        }
    }

    fn instant_policy() -> ReconnectPolicy {
        ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn offset_advances_past_every_delivered_update() {
        let transport = ScriptedTransport::new(vec![
            Ok(Polled::Batch(vec![update(10), update(11)])),
            Ok(Polled::Batch(vec![update(12)])),
            Ok(Polled::Closed),
        ]);
        let handler = CountingHandler::default();

        UpdatePoller::new(&transport, &handler, instant_policy()).run().await.expect("run");

        assert_eq!(transport.offsets(), vec![0, 12, 13]);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_stop_dispatch() {
        let transport = ScriptedTransport::new(vec![
            Ok(Polled::Batch(vec![update(1), update(2), update(3)])),
            Ok(Polled::Closed),
        ]);
        let handler = CountingHandler { handled: AtomicU32::new(0), fail_first: true };

        UpdatePoller::new(&transport, &handler, instant_policy()).run().await.expect("run");

        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
        // The failed update is still acknowledged; it is never refetched.
        assert_eq!(transport.offsets(), vec![0, 4]);
    }

    #[tokio::test]
    async fn transient_failures_recover_and_reset_the_retry_budget() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Receive("timeout".to_owned())),
            Ok(Polled::Batch(vec![update(5)])),
            Err(TransportError::Receive("timeout".to_owned())),
            Err(TransportError::Receive("timeout".to_owned())),
            Ok(Polled::Batch(vec![update(6)])),
            Ok(Polled::Closed),
        ]);
        let handler = CountingHandler::default();

        UpdatePoller::new(&transport, &handler, instant_policy()).run().await.expect("run");

        assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_end_the_loop_without_an_error() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Receive("down".to_owned())),
            Err(TransportError::Receive("down".to_owned())),
            Err(TransportError::Receive("down".to_owned())),
            // Never reached: the budget of 2 retries is spent above.
            Ok(Polled::Batch(vec![update(1)])),
        ]);
        let handler = CountingHandler::default();

        UpdatePoller::new(&transport, &handler, instant_policy()).run().await.expect("run");

        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
        assert_eq!(transport.offsets().len(), 3);
    }

    #[test]
    fn backoff_grows_exponentially_and_respects_the_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(5000));
    }
}
