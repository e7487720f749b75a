use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::cart::Cart;
use crate::domain::{Agent, Area, Product, Shop};
use crate::evidence::EvidenceRef;
use crate::flow::FlowState;

/// Per-user in-progress conversation state. Created on `/order`, destroyed on
/// every terminal outcome (submit, cancel, precondition failure) or by the
/// idle sweep. Lives only in process memory.
#[derive(Clone, Debug)]
pub struct Session {
    pub agent: Agent,
    pub state: FlowState,
    pub area: Option<Area>,
    pub shop: Option<Shop>,
    pub cart: Cart,
    pub focused_product: Option<Product>,
    pub evidence: Option<EvidenceRef>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            state: FlowState::SelectArea,
            area: None,
            shop: None,
            cart: Cart::new(),
            focused_product: None,
            evidence: None,
            last_activity: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// In-memory session registry keyed by the user's external handle.
///
/// The messaging gateway serializes interactions per chat, so no two events
/// for one handle run concurrently; sessions are checked out whole with
/// `take` and checked back in with `put` instead of being mutated under the
/// map lock, keeping unrelated identities from contending during I/O.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh session, discarding any in-progress one for the handle.
    pub async fn begin(&self, handle: &str, agent: Agent) {
        self.inner.lock().await.insert(handle.to_owned(), Session::new(agent));
    }

    /// Checks the session out. Callers must `put` it back unless the
    /// conversation reached a terminal state.
    pub async fn take(&self, handle: &str) -> Option<Session> {
        self.inner.lock().await.remove(handle)
    }

    pub async fn put(&self, handle: &str, mut session: Session) {
        session.touch();
        self.inner.lock().await.insert(handle.to_owned(), session);
    }

    pub async fn remove(&self, handle: &str) -> bool {
        self.inner.lock().await.remove(handle).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Drops sessions idle for longer than `max_idle` and returns how many
    /// were evicted. Unbounded retention would be a resource leak; the
    /// binary runs this on a timer.
    pub async fn expire_older_than(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.inner.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity >= cutoff);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{Session, SessionStore};
    use crate::domain::{Agent, UserId};

    fn agent(id: i64, handle: &str) -> Agent {
        Agent { id: UserId(id), name: format!("Agent {id}"), handle: handle.to_owned() }
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_handle() {
        let store = SessionStore::new();
        store.begin("alpha", agent(1, "alpha")).await;
        store.begin("beta", agent(2, "beta")).await;

        let alpha = store.take("alpha").await.expect("alpha session");
        assert_eq!(alpha.agent.id, UserId(1));
        assert!(store.take("alpha").await.is_none(), "taken session is checked out");
        assert!(store.take("beta").await.is_some());
    }

    #[tokio::test]
    async fn begin_discards_any_prior_session() {
        let store = SessionStore::new();
        store.begin("alpha", agent(1, "alpha")).await;
        let mut session = store.take("alpha").await.expect("session");
        session.cart.upsert(crate::domain::ProductId(1), 5);
        store.put("alpha", session).await;

        store.begin("alpha", agent(1, "alpha")).await;
        let fresh = store.take("alpha").await.expect("fresh session");
        assert!(fresh.cart.is_empty(), "restart clears prior order data");
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let store = SessionStore::new();
        let mut stale = Session::new(agent(1, "alpha"));
        stale.last_activity = chrono::Utc::now() - Duration::minutes(45);
        store.inner.lock().await.insert("alpha".to_owned(), stale);
        store.begin("beta", agent(2, "beta")).await;

        let evicted = store.expire_older_than(Duration::minutes(30)).await;
        assert_eq!(evicted, 1);
        assert!(store.take("alpha").await.is_none());
        assert!(store.take("beta").await.is_some());
    }
}
