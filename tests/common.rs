use partswap_chat::ChatCore;
use partswap_chat::config::Config;
use partswap_chat::domain::{Listing, UserProfile};
use partswap_chat::storage::{ChatStore, MemoryStore};
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("partswap_chat=debug".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// Test config: short debounce and heartbeat so timing-sensitive paths
/// settle within a test-friendly window.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.sync.reload_debounce_ms = 100;
    config.sync.store_timeout_secs = 2;
    config.presence.heartbeat_interval_secs = 1;
    config
}

/// One shared in-memory store plus the config every client uses. Spawning
/// multiple clients against the same store simulates separate devices.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        setup_tracing();
        Self { store: Arc::new(MemoryStore::new(64)), config: test_config() }
    }

    pub fn client(&self) -> ChatCore {
        ChatCore::new(Arc::clone(&self.store) as Arc<dyn ChatStore>, &self.config)
    }

    #[allow(dead_code)]
    pub fn register_user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.upsert_profile(UserProfile {
            id,
            display_name: name.to_string(),
            team_number: None,
            avatar_url: None,
        });
        id
    }

    #[allow(dead_code)]
    pub fn register_listing(&self, seller_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.upsert_listing(Listing {
            id,
            seller_id,
            title: title.to_string(),
            price_cents: Some(4500),
            image_url: None,
        });
        id
    }

    /// Signs in and waits for the client's change-feed subscription to be
    /// live and its initial thread load to have run, so writes made
    /// afterwards are guaranteed to be heard as events rather than racing
    /// the sign-in snapshot.
    pub async fn sign_in(&self, client: &ChatCore, user_id: Uuid) {
        let subscribers_before = self.store.subscriber_count();
        let fetches_before = self.store.thread_list_fetches();
        client.sign_in(user_id).await;
        assert!(
            wait_until(2000, || {
                self.store.subscriber_count() > subscribers_before
                    && self.store.thread_list_fetches() > fetches_before
            })
            .await,
            "change-feed subscription was not established"
        );
    }
}

/// Polls `cond` every 10ms until it holds or `deadline_ms` elapses.
pub async fn wait_until(deadline_ms: u64, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// A settle pause for asserting that something does NOT happen.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}
