use crate::{
    app::identity::UserId,
    ledger::{
        GameRecord,
        UserBalance,
    },
};

/// Persistent collection of per-user balances. One record per user, keyed by
/// the opaque user id. Semantics are plain document-store writes: no
/// transactions, no versioning.
pub trait BalanceStore {
    fn load(&self, user: &UserId) -> crate::Result<Option<UserBalance>>;

    /// Write the opening record for a user seen for the first time.
    fn create(&mut self, balance: &UserBalance) -> crate::Result<()>;

    /// Overwrite the record for an existing user.
    fn update(&mut self, balance: &UserBalance) -> crate::Result<()>;
}

/// Append-only collection of resolved wagers.
pub trait GameStore {
    fn append(&mut self, record: &GameRecord) -> crate::Result<()>;

    /// Most recent records for a user, newest first, at most `limit`.
    fn recent(&self, user: &UserId, limit: usize)
    -> crate::Result<Vec<GameRecord>>;
}
