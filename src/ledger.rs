use crate::{
    app::{
        identity::UserId,
        store::{
            BalanceStore,
            GameStore,
        },
    },
    game::{
        ProductInfo,
        WagerOutcome,
    },
};
use anyhow::Context;
use chrono::{
    DateTime,
    Utc,
};
use rust_decimal::Decimal;
use serde::{
    Deserialize,
    Serialize,
};
use uuid::Uuid;

/// Running balance and lifetime counters for one user. Created lazily on
/// first access and mutated only by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub user_id: UserId,
    pub balance: Decimal,
    pub total_winnings: Decimal,
    pub total_bets: Decimal,
    pub games_played: u64,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// Every new user starts with 100.00 and zeroed counters.
    pub fn opening(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Decimal::ONE_HUNDRED,
            total_winnings: Decimal::ZERO,
            total_bets: Decimal::ZERO,
            games_played: 0,
            updated_at: now,
        }
    }
}

/// Immutable record of one resolved wager, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub product_price: Decimal,
    pub bet_amount: Decimal,
    pub dice_roll: crate::game::DieRoll,
    pub won: bool,
    pub payout_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn from_outcome(
        user_id: UserId,
        product: &ProductInfo,
        outcome: &WagerOutcome,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            product_url: Some(product.url.clone()),
            product_name: product.name.clone(),
            product_price: outcome.price,
            bet_amount: outcome.stake,
            dice_roll: outcome.roll,
            won: outcome.won,
            payout_amount: outcome.payout,
            created_at: now,
        }
    }
}

/// What the caller gets back after a settled wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerReceipt {
    pub record: GameRecord,
    pub balance: UserBalance,
}

/// Apply a resolved wager to a balance. Pure arithmetic, no clamping: a
/// balance may go negative here. Affordability is a policy decision made by
/// the caller before the wager is resolved, not a ledger invariant.
///
/// Not idempotent: applying the same outcome twice double-counts, so callers
/// must invoke this at most once per resolved wager.
pub fn apply_outcome(
    balance: &UserBalance,
    outcome: &WagerOutcome,
    now: DateTime<Utc>,
) -> UserBalance {
    UserBalance {
        user_id: balance.user_id.clone(),
        balance: balance.balance - outcome.stake + outcome.payout,
        total_winnings: balance.total_winnings + outcome.payout,
        total_bets: balance.total_bets + outcome.stake,
        games_played: balance.games_played + 1,
        updated_at: now,
    }
}

/// Bookkeeping over the two persistent collections: balances and game
/// history.
pub struct Ledger<Balances, Games> {
    balances: Balances,
    games: Games,
}

impl<Balances, Games> Ledger<Balances, Games> {
    pub fn new(balances: Balances, games: Games) -> Self {
        Self { balances, games }
    }
}

impl<Balances: BalanceStore, Games: GameStore> Ledger<Balances, Games> {
    /// Load the user's balance, creating the opening record on first access.
    pub fn load_or_create(&mut self, user: &UserId) -> crate::Result<UserBalance> {
        if let Some(existing) = self
            .balances
            .load(user)
            .with_context(|| format!("load balance for {user}"))?
        {
            return Ok(existing);
        }
        let opening = UserBalance::opening(user.clone(), Utc::now());
        self.balances
            .create(&opening)
            .with_context(|| format!("create opening balance for {user}"))?;
        Ok(opening)
    }

    /// Settle a resolved wager: update the balance, then append the history
    /// record. The two writes are independent and not wrapped in a
    /// transaction, so a failed append leaves the balance updated with no
    /// matching history row. Callers retry the whole wager; there is no way
    /// to resume halfway.
    pub fn settle(
        &mut self,
        user: &UserId,
        product: &ProductInfo,
        outcome: &WagerOutcome,
    ) -> crate::Result<WagerReceipt> {
        let current = self.load_or_create(user)?;
        let now = Utc::now();
        let updated = apply_outcome(&current, outcome, now);
        self.balances
            .update(&updated)
            .with_context(|| format!("persist updated balance for {user}"))?;
        let record = GameRecord::from_outcome(user.clone(), product, outcome, now);
        self.games
            .append(&record)
            .with_context(|| format!("append game record for {user}"))?;
        Ok(WagerReceipt {
            record,
            balance: updated,
        })
    }

    /// Most recent games for a user, newest first.
    pub fn recent_games(
        &self,
        user: &UserId,
        limit: usize,
    ) -> crate::Result<Vec<GameRecord>> {
        self.games
            .recent(user, limit)
            .with_context(|| format!("list game history for {user}"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        app::in_memory_store::{
            InMemoryBalanceStore,
            InMemoryGameStore,
        },
        game::{
            DieRoll,
            resolve,
        },
    };
    use rust_decimal_macros::dec;

    fn user() -> UserId {
        UserId::new("user_1").unwrap()
    }

    fn product(price: Decimal) -> ProductInfo {
        ProductInfo {
            url: "https://shop.example/item".to_string(),
            name: Some("Item".to_string()),
            price: Some(price),
            image: None,
        }
    }

    fn ledger() -> Ledger<InMemoryBalanceStore, InMemoryGameStore> {
        Ledger::new(InMemoryBalanceStore::new(), InMemoryGameStore::new())
    }

    #[test]
    fn apply_outcome__win_credits_payout_net_of_stake() {
        // given
        let balance = UserBalance::opening(user(), Utc::now());
        let outcome = resolve(dec!(100.00), DieRoll::new(6).unwrap()).unwrap();

        // when
        let updated = apply_outcome(&balance, &outcome, Utc::now());

        // then
        assert_eq!(updated.balance, dec!(180.00));
        assert_eq!(updated.total_winnings, dec!(100.00));
        assert_eq!(updated.total_bets, dec!(20.00));
        assert_eq!(updated.games_played, 1);
    }

    #[test]
    fn apply_outcome__loss_charges_stake_only() {
        // given
        let balance = UserBalance::opening(user(), Utc::now());
        let outcome = resolve(dec!(50.00), DieRoll::new(3).unwrap()).unwrap();

        // when
        let updated = apply_outcome(&balance, &outcome, Utc::now());

        // then
        assert_eq!(updated.balance, dec!(90.00));
        assert_eq!(updated.total_winnings, Decimal::ZERO);
        assert_eq!(updated.total_bets, dec!(10.00));
        assert_eq!(updated.games_played, 1);
    }

    #[test]
    fn apply_outcome__is_not_idempotent() {
        // applying the same outcome twice double-counts, which documents the
        // at-most-once-call contract required of the caller
        let balance = UserBalance::opening(user(), Utc::now());
        let outcome = resolve(dec!(50.00), DieRoll::new(3).unwrap()).unwrap();

        let once = apply_outcome(&balance, &outcome, Utc::now());
        let twice = apply_outcome(&once, &outcome, Utc::now());

        assert_ne!(once.balance, twice.balance);
        assert_eq!(twice.balance, dec!(80.00));
        assert_eq!(twice.games_played, 2);
    }

    #[test]
    fn apply_outcome__permits_negative_balances() {
        // the ledger does not enforce affordability; that gate lives with the
        // caller
        let balance = UserBalance::opening(user(), Utc::now());
        let outcome = resolve(dec!(1000.00), DieRoll::new(2).unwrap()).unwrap();

        let updated = apply_outcome(&balance, &outcome, Utc::now());

        assert_eq!(updated.balance, dec!(-100.00));
    }

    #[test]
    fn load_or_create__first_access_creates_opening_balance() {
        // given
        let mut ledger = ledger();

        // when
        let balance = ledger.load_or_create(&user()).unwrap();

        // then
        assert_eq!(balance.balance, dec!(100.00));
        assert_eq!(balance.games_played, 0);

        // a second load returns the persisted record, not a fresh one
        let again = ledger.load_or_create(&user()).unwrap();
        assert_eq!(again, balance);
    }

    #[test]
    fn settle__persists_balance_and_appends_history() {
        // given
        let mut ledger = ledger();
        let outcome = resolve(dec!(100.00), DieRoll::new(6).unwrap()).unwrap();

        // when
        let receipt = ledger
            .settle(&user(), &product(dec!(100.00)), &outcome)
            .unwrap();

        // then
        assert_eq!(receipt.balance.balance, dec!(180.00));
        assert!(receipt.record.won);
        assert_eq!(receipt.record.bet_amount, dec!(20.00));
        assert_eq!(receipt.record.payout_amount, dec!(100.00));

        let history = ledger.recent_games(&user(), 20).unwrap();
        assert_eq!(history, vec![receipt.record]);
    }

    #[test]
    fn settle__history_append_failure_leaves_balance_without_record() {
        // given a game store that fails its next write
        let balances = InMemoryBalanceStore::new();
        let games = InMemoryGameStore::new();
        games.fail_writes(true);
        let mut ledger = Ledger::new(balances.clone(), games.clone());
        let outcome = resolve(dec!(50.00), DieRoll::new(3).unwrap()).unwrap();

        // when
        let result = ledger.settle(&user(), &product(dec!(50.00)), &outcome);

        // then the error is surfaced as retryable, but the balance write has
        // already landed: this is the documented partial-failure window
        assert!(result.is_err());
        let stored = balances.load_raw(&user()).unwrap();
        assert_eq!(stored.balance, dec!(90.00));
        games.fail_writes(false);
        assert!(ledger.recent_games(&user(), 20).unwrap().is_empty());
    }

    #[test]
    fn settle__balance_write_failure_persists_nothing() {
        // given a balance store that fails its next write
        let balances = InMemoryBalanceStore::new();
        let games = InMemoryGameStore::new();
        let mut ledger = Ledger::new(balances.clone(), games.clone());
        // seed the opening balance first so the failing write is the update
        ledger.load_or_create(&user()).unwrap();
        balances.fail_writes(true);
        let outcome = resolve(dec!(50.00), DieRoll::new(3).unwrap()).unwrap();

        // when
        let result = ledger.settle(&user(), &product(dec!(50.00)), &outcome);

        // then
        assert!(result.is_err());
        balances.fail_writes(false);
        let stored = balances.load_raw(&user()).unwrap();
        assert_eq!(stored.balance, dec!(100.00));
        assert!(ledger.recent_games(&user(), 20).unwrap().is_empty());
    }

    #[test]
    fn recent_games__returns_newest_first_up_to_limit() {
        // given
        let mut ledger = ledger();
        for price in [dec!(10.00), dec!(20.00), dec!(30.00)] {
            let outcome = resolve(price, DieRoll::new(1).unwrap()).unwrap();
            ledger.settle(&user(), &product(price), &outcome).unwrap();
        }

        // when
        let history = ledger.recent_games(&user(), 2).unwrap();

        // then
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].product_price, dec!(30.00));
        assert_eq!(history[1].product_price, dec!(20.00));
    }
}
