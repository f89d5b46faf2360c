// Sled-backed implementations of the balance and game collections.
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
use anyhow::Context;
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use sled::{
    Config,
    Db,
    Tree,
};
use std::path::Path;

#[derive(Clone)]
pub struct SledBalanceStore {
    tree: Tree,
}

#[derive(Clone)]
pub struct SledGameStore {
    tree: Tree,
}

/// Open both collections inside one sled database at `path`.
pub fn open<P: AsRef<Path>>(
    path: P,
) -> crate::Result<(SledBalanceStore, SledGameStore)> {
    let config = Config::default().path(path);
    let db = config.open().context("open sled database")?;
    Ok((SledBalanceStore::new(&db)?, SledGameStore::new(&db)?))
}

impl SledBalanceStore {
    pub fn new(db: &Db) -> crate::Result<Self> {
        let tree = db
            .open_tree("user_balances")
            .context("open user_balances tree")?;
        Ok(Self { tree })
    }

    fn persist(&self, balance: &UserBalance) -> crate::Result<()> {
        let bytes = serialize(balance, "user balance")?;
        self.tree
            .insert(balance.user_id.as_str(), bytes)
            .context("persist user balance")?;
        self.tree.flush().context("flush user balances")?;
        Ok(())
    }
}

impl BalanceStore for SledBalanceStore {
    fn load(&self, user: &UserId) -> crate::Result<Option<UserBalance>> {
        let value = match self.tree.get(user.as_str())? {
            Some(value) => value,
            None => return Ok(None),
        };
        let balance = deserialize::<UserBalance>(value.as_ref())?;
        Ok(Some(balance))
    }

    fn create(&mut self, balance: &UserBalance) -> crate::Result<()> {
        self.persist(balance)
    }

    fn update(&mut self, balance: &UserBalance) -> crate::Result<()> {
        self.persist(balance)
    }
}

impl SledGameStore {
    pub fn new(db: &Db) -> crate::Result<Self> {
        let tree = db.open_tree("games").context("open games tree")?;
        Ok(Self { tree })
    }

    /// Keys sort newest-first under a per-user prefix scan: the creation
    /// timestamp is inverted and fixed-width so lexicographic order is
    /// reverse-chronological. The record id keeps same-millisecond keys
    /// unique. `UserId` construction bans the `|` delimiter, so no id can
    /// sit inside another user's prefix.
    fn record_key(record: &GameRecord) -> Vec<u8> {
        let millis = record.created_at.timestamp_millis().max(0) as u64;
        let inverted = u64::MAX - millis;
        format!("{}|{inverted:016x}|{}", record.user_id, record.id).into_bytes()
    }

    fn user_prefix(user: &UserId) -> Vec<u8> {
        format!("{user}|").into_bytes()
    }
}

impl GameStore for SledGameStore {
    fn append(&mut self, record: &GameRecord) -> crate::Result<()> {
        let key = Self::record_key(record);
        let bytes = serialize(record, "game record")?;
        self.tree
            .insert(key, bytes)
            .context("persist game record")?;
        self.tree.flush().context("flush game records")?;
        Ok(())
    }

    fn recent(
        &self,
        user: &UserId,
        limit: usize,
    ) -> crate::Result<Vec<GameRecord>> {
        let mut records = Vec::new();
        for entry in self.tree.scan_prefix(Self::user_prefix(user)) {
            if records.len() == limit {
                break;
            }
            let (_, value) = entry.context("iterate game records")?;
            let record = deserialize::<GameRecord>(value.as_ref())?;
            // the prefix scan already scopes to one user; the owner check
            // guards against any record written under a foreign key
            if record.user_id == *user {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn serialize<T: Serialize>(value: &T, label: &str) -> crate::Result<Vec<u8>> {
    serde_json::to_vec(value).with_context(|| format!("serialize {label}"))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> crate::Result<T> {
    serde_json::from_slice(bytes).context("deserialize sled record")
}
