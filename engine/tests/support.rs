//! Shared test harness: an in-memory document store with failure
//! injection, a manual clock, and a seeded engine.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use chrono_tz::America::New_York;
use tokio::sync::Mutex;

use common::clock::Clock;
use common::keys::{DayKey, SlotKey};
use engine::Engine;
use store::{Config, Document, DocumentStore, Role, User};

#[derive(Default)]
pub struct MemStore {
    pub saved: Mutex<Option<Document>>,
    pub save_count: AtomicUsize,
    pub fail_next_save: AtomicBool,
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn load(&self) -> anyhow::Result<Option<Document>> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, doc: &Document) -> anyhow::Result<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            anyhow::bail!("injected store failure");
        }
        *self.saved.lock().await = Some(doc.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn day(s: &str) -> DayKey {
    s.parse().unwrap()
}

pub fn key(d: &str, hour: u8, gpu: u8) -> SlotKey {
    SlotKey::new(day(d), hour, gpu)
}

/// 2025-06-10 14:30 Eastern (18:30 UTC). Transition hour 0, so "today" is
/// 2025-06-10 and the first open day is 2025-06-11.
pub const TODAY: &str = "2025-06-10";
pub const OPEN_DAY: &str = "2025-06-11";

pub fn test_clock() -> Clock {
    let start = Utc.with_ymd_and_hms(2025, 6, 10, 18, 30, 0).unwrap();
    Clock::manual(New_York, 0, start)
}

pub fn seeded_user(balance: u32, budget: u32, role: Role) -> User {
    User {
        password_hash: String::new(),
        salt: String::new(),
        role,
        weekly_budget: budget,
        balance: balance.into(),
        rollover_applied_for_day: None,
        extra: Default::default(),
    }
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub store: Arc<MemStore>,
    pub clock: Clock,
}

impl Harness {
    /// Seeded with users alice/bob/carol (balance 10, budget 10) and the
    /// admin root; no days until the first tick.
    pub fn new() -> Self {
        let clock = test_clock();
        let config = Config {
            num_gpus: 8,
            transition_hour: 0,
            planning_horizon_days: 3,
            ..Config::default()
        };

        let mut doc = Document::bootstrap(config);
        for name in ["alice", "bob", "carol"] {
            doc.users
                .insert(name.to_string(), seeded_user(10, 10, Role::User));
        }
        doc.users
            .insert("root".to_string(), seeded_user(10, 10, Role::Admin));

        let store = Arc::new(MemStore::default());
        let engine = Arc::new(Engine::new(doc, store.clone(), clock.clone()));
        Self {
            engine,
            store,
            clock,
        }
    }

    /// Tick until the planning window exists and today executes.
    pub async fn ticked() -> Self {
        let h = Self::new();
        h.engine.tick().await.unwrap();
        h
    }

    pub async fn balance(&self, username: &str) -> rust_decimal::Decimal {
        self.engine
            .read(|doc| doc.users[username].balance)
            .await
    }

    pub async fn available(&self, username: &str) -> rust_decimal::Decimal {
        self.engine
            .overview(username)
            .await
            .unwrap()
            .user
            .available
    }

    pub async fn slot_state(&self, k: SlotKey) -> (u32, Option<String>, usize) {
        self.engine
            .read(|doc| {
                let slot = doc.slot(&k).unwrap();
                let live_bids = slot.bids.iter().filter(|b| !b.undone).count();
                (slot.price, slot.winner.clone(), live_bids)
            })
            .await
    }
}
