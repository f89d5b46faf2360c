use crate::{
    app::{
        identity::UserId,
        store::{
            BalanceStore,
            GameStore,
        },
    },
    ledger::{
        GameRecord,
        UserBalance,
    },
};
use anyhow::anyhow;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};

/// In-memory balance collection for tests and local experiments. Clones share
/// the same underlying map. Writes can be made to fail on demand to exercise
/// the persistence-failure paths.
#[derive(Clone, Default)]
pub struct InMemoryBalanceStore {
    balances: Arc<Mutex<HashMap<String, UserBalance>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// Direct read bypassing the trait, for assertions in tests.
    pub fn load_raw(&self, user: &UserId) -> Option<UserBalance> {
        let guard = self.balances.lock().unwrap();
        guard.get(user.as_str()).cloned()
    }

    fn write(&self, balance: &UserBalance) -> crate::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("injected balance write failure"));
        }
        let mut guard = self.balances.lock().unwrap();
        guard.insert(balance.user_id.as_str().to_string(), balance.clone());
        Ok(())
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn load(&self, user: &UserId) -> crate::Result<Option<UserBalance>> {
        let guard = self.balances.lock().unwrap();
        Ok(guard.get(user.as_str()).cloned())
    }

    fn create(&mut self, balance: &UserBalance) -> crate::Result<()> {
        self.write(balance)
    }

    fn update(&mut self, balance: &UserBalance) -> crate::Result<()> {
        self.write(balance)
    }
}

/// In-memory game history. Append order doubles as the time order, so
/// `recent` walks the log backwards.
#[derive(Clone, Default)]
pub struct InMemoryGameStore {
    games: Arc<Mutex<Vec<GameRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }
}

impl GameStore for InMemoryGameStore {
    fn append(&mut self, record: &GameRecord) -> crate::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("injected game write failure"));
        }
        let mut guard = self.games.lock().unwrap();
        guard.push(record.clone());
        Ok(())
    }

    fn recent(
        &self,
        user: &UserId,
        limit: usize,
    ) -> crate::Result<Vec<GameRecord>> {
        let guard = self.games.lock().unwrap();
        Ok(guard
            .iter()
            .rev()
            .filter(|record| &record.user_id == user)
            .take(limit)
            .cloned()
            .collect())
    }
}
