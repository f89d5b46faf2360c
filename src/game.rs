use anyhow::anyhow;
use rand::Rng;
use rust_decimal::{
    Decimal,
    RoundingStrategy,
};
use serde::{
    Deserialize,
    Serialize,
};

/// A single face of a six-sided die. Construction is validated so the rest of
/// the crate never sees an out-of-range roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DieRoll(u8);

impl DieRoll {
    pub fn new(value: u8) -> crate::Result<Self> {
        if (1..=6).contains(&value) {
            Ok(Self(value))
        } else {
            Err(anyhow!("die roll must be between 1 and 6, got {value}"))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// A wager is won on a six and nothing else.
    pub fn is_winner(self) -> bool {
        self.0 == 6
    }
}

impl TryFrom<u8> for DieRoll {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> crate::Result<Self> {
        DieRoll::new(value)
    }
}

impl From<DieRoll> for u8 {
    fn from(roll: DieRoll) -> Self {
        roll.0
    }
}

impl std::fmt::Display for DieRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of die draws. The engine never rolls for itself so tests and
/// replays can inject a controlled sequence.
pub trait DieSource {
    fn next_roll(&mut self) -> DieRoll;
}

/// Uniform draws from the thread rng.
pub struct RandomDie;

impl DieSource for RandomDie {
    fn next_roll(&mut self) -> DieRoll {
        DieRoll(rand::rng().random_range(1..=6))
    }
}

/// Deterministic die that yields the configured rolls in order, cycling when
/// exhausted. `rolls` must be non-empty.
pub struct FixedDie {
    rolls: Vec<DieRoll>,
    next: usize,
}

impl FixedDie {
    pub fn new(rolls: Vec<DieRoll>) -> Self {
        assert!(!rolls.is_empty(), "FixedDie needs at least one roll");
        Self { rolls, next: 0 }
    }
}

impl DieSource for FixedDie {
    fn next_roll(&mut self) -> DieRoll {
        let roll = self.rolls[self.next % self.rolls.len()];
        self.next += 1;
        roll
    }
}

/// Transient product details collected before a wager. Only `price` gates
/// whether a wager can be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A resolved wager. `price` is the stake basis, `stake` is recorded at
/// resolution time and never re-derived from stored records, so historical
/// records stay stable even if the rounding rules change later.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerOutcome {
    pub price: Decimal,
    pub stake: Decimal,
    pub roll: DieRoll,
    pub won: bool,
    pub payout: Decimal,
}

/// The stake is 20% of the product price, rounded once to currency precision.
pub fn stake_for(price: Decimal) -> Decimal {
    (price * Decimal::new(2, 1))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Resolve a wager from a price and a die draw. Pure; the only error is the
/// positive-price precondition, checked before any state is touched.
pub fn resolve(price: Decimal, roll: DieRoll) -> crate::Result<WagerOutcome> {
    if price <= Decimal::ZERO {
        return Err(anyhow!("product price must be positive, got {price}"));
    }
    let stake = stake_for(price);
    let won = roll.is_winner();
    let payout = if won { price } else { Decimal::ZERO };
    Ok(WagerOutcome {
        price,
        stake,
        roll,
        won,
        payout,
    })
}

/// Parse a manually entered price. Non-numeric or non-positive input is
/// rejected before any wager is created.
pub fn parse_manual_price(input: &str) -> crate::Result<Decimal> {
    let trimmed = input.trim();
    let price: Decimal = trimmed
        .parse()
        .map_err(|_| anyhow!("'{trimmed}' is not a valid price"))?;
    if price <= Decimal::ZERO {
        return Err(anyhow!("price must be positive, got {price}"));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn resolve__roll_of_six_pays_out_full_price() {
        // given
        let price = dec!(100.00);
        let roll = DieRoll::new(6).unwrap();

        // when
        let outcome = resolve(price, roll).unwrap();

        // then
        assert!(outcome.won);
        assert_eq!(outcome.stake, dec!(20.00));
        assert_eq!(outcome.payout, dec!(100.00));
    }

    #[test]
    fn resolve__losing_roll_pays_nothing() {
        // given
        let price = dec!(50.00);
        let roll = DieRoll::new(3).unwrap();

        // when
        let outcome = resolve(price, roll).unwrap();

        // then
        assert!(!outcome.won);
        assert_eq!(outcome.stake, dec!(10.00));
        assert_eq!(outcome.payout, Decimal::ZERO);
    }

    #[test]
    fn resolve__rejects_zero_and_negative_prices() {
        let roll = DieRoll::new(6).unwrap();
        assert!(resolve(Decimal::ZERO, roll).is_err());
        assert!(resolve(dec!(-10.00), roll).is_err());
    }

    #[test]
    fn stake_for__rounds_to_currency_precision_once() {
        // 20% of 0.07 is 0.014, which rounds down to a single cent
        assert_eq!(stake_for(dec!(0.07)), dec!(0.01));
        // midpoints round away from zero
        assert_eq!(stake_for(dec!(0.075)), dec!(0.02));
        assert_eq!(stake_for(dec!(99.99)), dec!(20.00));
    }

    #[test]
    fn die_roll__rejects_out_of_range_values() {
        assert!(DieRoll::new(0).is_err());
        assert!(DieRoll::new(7).is_err());
        assert!(DieRoll::new(1).is_ok());
        assert!(DieRoll::new(6).is_ok());
    }

    #[test]
    fn fixed_die__cycles_through_configured_rolls() {
        // given
        let rolls = vec![DieRoll::new(2).unwrap(), DieRoll::new(6).unwrap()];
        let mut die = FixedDie::new(rolls);

        // when / then
        assert_eq!(die.next_roll().value(), 2);
        assert_eq!(die.next_roll().value(), 6);
        assert_eq!(die.next_roll().value(), 2);
    }

    #[test]
    fn random_die__win_rate_converges_to_one_sixth() {
        // given
        let mut die = RandomDie;
        let samples = 60_000;

        // when
        let wins = (0..samples)
            .filter(|_| die.next_roll().is_winner())
            .count();

        // then
        let rate = wins as f64 / samples as f64;
        assert!(
            (0.14..=0.20).contains(&rate),
            "win rate {rate} is not close to 1/6"
        );
    }

    #[test]
    fn parse_manual_price__rejects_garbage_and_non_positive_input() {
        assert!(parse_manual_price("abc").is_err());
        assert!(parse_manual_price("").is_err());
        assert!(parse_manual_price("0").is_err());
        assert!(parse_manual_price("-4.20").is_err());
        assert_eq!(parse_manual_price(" 99.99 ").unwrap(), dec!(99.99));
    }

    proptest! {
        #[test]
        fn stake_is_a_fifth_of_the_price_within_rounding(cents in 1i64..=100_000_000) {
            let price = Decimal::new(cents, 2);
            let stake = stake_for(price);

            // never more than two decimal places
            prop_assert!(stake.scale() <= 2);
            // five stakes reassemble the price up to accumulated rounding error
            let error = (price - stake * Decimal::from(5)).abs();
            prop_assert!(error <= Decimal::new(25, 3));
        }

        #[test]
        fn payout_is_price_exactly_when_won_and_zero_otherwise(
            cents in 1i64..=100_000_000,
            roll in 1u8..=6,
        ) {
            let price = Decimal::new(cents, 2);
            let roll = DieRoll::new(roll).unwrap();
            let outcome = resolve(price, roll).unwrap();

            prop_assert_eq!(outcome.won, roll.value() == 6);
            if outcome.won {
                prop_assert_eq!(outcome.payout, price);
            } else {
                prop_assert_eq!(outcome.payout, Decimal::ZERO);
            }
        }
    }
}
