use crate::{
    game::ProductInfo,
    ledger::{
        GameRecord,
        UserBalance,
        WagerReceipt,
    },
};
use rust_decimal::Decimal;
use std::fmt;
use tokio::sync::oneshot;

/// Source of queries for the app actor. Implementations bridge some outer
/// surface (HTTP in production, a channel in tests) into `Query` values.
pub trait QueryAPI {
    async fn query(&mut self) -> crate::Result<Query>;
}

pub type QueryReply<T> = std::result::Result<T, QueryError>;

/// One request from the outer surface, carrying its response channel.
#[derive(Debug)]
pub enum Query {
    Balance(BalanceQuery),
    History(HistoryQuery),
    Product(ProductQuery),
    Wager(WagerQuery),
}

#[derive(Debug)]
pub struct BalanceQuery {
    pub user: String,
    pub sender: oneshot::Sender<QueryReply<UserBalance>>,
}

#[derive(Debug)]
pub struct HistoryQuery {
    pub user: String,
    pub limit: Option<usize>,
    pub sender: oneshot::Sender<QueryReply<Vec<GameRecord>>>,
}

#[derive(Debug)]
pub struct ProductQuery {
    pub url: String,
    /// Title from an earlier lookup, kept on the manual-price path.
    pub name: Option<String>,
    /// Manually entered price, used instead of extraction when present.
    pub manual_price: Option<String>,
    pub sender: oneshot::Sender<QueryReply<ProductInfo>>,
}

#[derive(Debug)]
pub struct WagerQuery {
    pub user: String,
    pub product: ProductInfo,
    pub sender: oneshot::Sender<QueryReply<WagerReceipt>>,
}

/// Errors surfaced to the caller. Everything here is recoverable: the caller
/// fixes their input or retries the same request.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    UnknownUser(String),
    InvalidUrl(String),
    InvalidPrice(String),
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
    /// Persistence failed; the stored state may be behind or ahead of what
    /// the caller saw. A reload reconciles.
    Store(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownUser(user) => {
                write!(f, "unknown user '{user}'")
            }
            QueryError::InvalidUrl(url) => {
                write!(f, "'{url}' is not a valid URL")
            }
            QueryError::InvalidPrice(reason) => {
                write!(f, "invalid price: {reason}")
            }
            QueryError::InsufficientBalance {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient balance: stake {required} exceeds available {available}"
                )
            }
            QueryError::Store(reason) => {
                write!(f, "storage failure, please retry: {reason}")
            }
        }
    }
}
