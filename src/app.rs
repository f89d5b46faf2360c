use crate::{
    app::{
        extractor::{
            PageExtractor,
            product_from_page,
        },
        identity::{
            IdentityProvider,
            UserId,
        },
        query_api::{
            BalanceQuery,
            HistoryQuery,
            ProductQuery,
            Query,
            QueryAPI,
            QueryError,
            QueryReply,
            WagerQuery,
        },
        store::{
            BalanceStore,
            GameStore,
        },
    },
    game::{
        DieSource,
        ProductInfo,
        parse_manual_price,
        resolve,
        stake_for,
    },
    ledger::Ledger,
};
use rust_decimal::Decimal;
use std::future::Future;
use tracing_subscriber::EnvFilter;
use url::Url;

pub mod actix_api;
pub mod extractor;
pub mod identity;
pub mod in_memory_store;
pub mod query_api;
pub mod sled_store;
pub mod store;


/// How many history entries a query returns when the caller does not say.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub enum RunState {
    Continue,
    Exit,
}

/// Single logical actor: one query in flight at a time, so no locking or
/// versioning wraps the two persistence writes per wager.
pub struct App<API, Balances, Games, Extractor, Die, Identity> {
    api: API,
    ledger: Ledger<Balances, Games>,
    extractor: Extractor,
    die: Die,
    identity: Identity,
    history_limit: usize,
}

impl<API, Balances, Games, Extractor, Die, Identity>
    App<API, Balances, Games, Extractor, Die, Identity>
{
    pub fn new(
        api: API,
        ledger: Ledger<Balances, Games>,
        extractor: Extractor,
        die: Die,
        identity: Identity,
        history_limit: usize,
    ) -> Self {
        Self {
            api,
            ledger,
            extractor,
            die,
            identity,
            history_limit,
        }
    }
}

impl<
    API: QueryAPI,
    Balances: BalanceStore,
    Games: GameStore,
    Extractor: PageExtractor,
    Die: DieSource,
    Identity: IdentityProvider,
> App<API, Balances, Games, Extractor, Die, Identity>
{
    /// Serve one query or exit on interrupt.
    pub async fn run(
        &mut self,
        interrupt: impl Future<Output = ()>,
    ) -> crate::Result<RunState> {
        tokio::select! {
            query = self.api.query() => {
                self.handle_query(query?).await;
                Ok(RunState::Continue)
            }
            _ = interrupt => Ok(RunState::Exit),
        }
    }

    async fn handle_query(&mut self, query: Query) {
        match query {
            Query::Balance(query) => self.handle_balance(query),
            Query::History(query) => self.handle_history(query),
            Query::Product(query) => self.handle_product(query).await,
            Query::Wager(query) => self.handle_wager(query),
        }
    }

    fn handle_balance(&mut self, query: BalanceQuery) {
        let reply = self
            .resolve_user(&query.user)
            .and_then(|user| {
                self.ledger.load_or_create(&user).map_err(store_error)
            });
        send_reply(query.sender, reply);
    }

    fn handle_history(&mut self, query: HistoryQuery) {
        let limit = query.limit.unwrap_or(self.history_limit);
        let reply = self.resolve_user(&query.user).and_then(|user| {
            self.ledger.recent_games(&user, limit).map_err(store_error)
        });
        send_reply(query.sender, reply);
    }

    async fn handle_product(&mut self, query: ProductQuery) {
        let url = match Url::parse(&query.url) {
            Ok(url) => url,
            Err(_) => {
                send_reply(
                    query.sender,
                    Err(QueryError::InvalidUrl(query.url)),
                );
                return;
            }
        };
        if let Some(raw) = &query.manual_price {
            // keep the title from the earlier lookup when the caller has one
            let reply = match parse_manual_price(raw) {
                Ok(price) => Ok(ProductInfo {
                    url: url.to_string(),
                    name: query
                        .name
                        .clone()
                        .or_else(|| Some("Product".to_string())),
                    price: Some(price),
                    image: None,
                }),
                Err(e) => Err(QueryError::InvalidPrice(e.to_string())),
            };
            send_reply(query.sender, reply);
            return;
        }
        // extraction failure is not fatal: fall back to a priceless product
        // so the caller can ask for manual entry
        let product = match self.extractor.extract(&url).await {
            Ok(content) => product_from_page(&url, &content),
            Err(e) => {
                tracing::warn!("page extraction failed for {url}: {e:#}");
                ProductInfo {
                    url: url.to_string(),
                    name: Some("Product".to_string()),
                    price: None,
                    image: None,
                }
            }
        };
        send_reply(query.sender, Ok(product));
    }

    fn handle_wager(&mut self, query: WagerQuery) {
        let reply = self.place_wager(&query.user, &query.product);
        send_reply(query.sender, reply);
    }

    fn place_wager(
        &mut self,
        user: &str,
        product: &ProductInfo,
    ) -> QueryReply<crate::ledger::WagerReceipt> {
        let user = self.resolve_user(user)?;
        let price = match product.price {
            Some(price) if price > Decimal::ZERO => price,
            Some(price) => {
                return Err(QueryError::InvalidPrice(format!(
                    "price must be positive, got {price}"
                )));
            }
            None => {
                return Err(QueryError::InvalidPrice(
                    "product has no price yet".to_string(),
                ));
            }
        };

        // affordability gate, mirroring the reference UI: the ledger itself
        // stays permissive
        let balance = self.ledger.load_or_create(&user).map_err(store_error)?;
        let stake = stake_for(price);
        if balance.balance < stake {
            return Err(QueryError::InsufficientBalance {
                required: stake,
                available: balance.balance,
            });
        }

        let roll = self.die.next_roll();
        let outcome = resolve(price, roll)
            .map_err(|e| QueryError::InvalidPrice(e.to_string()))?;
        let receipt = self
            .ledger
            .settle(&user, product, &outcome)
            .map_err(store_error)?;
        tracing::info!(
            "settled wager for {}: roll {} on {} staked {} paid {}",
            receipt.record.user_id,
            receipt.record.dice_roll,
            price,
            receipt.record.bet_amount,
            receipt.record.payout_amount,
        );
        Ok(receipt)
    }

    fn resolve_user(&self, raw: &str) -> QueryReply<UserId> {
        match self.identity.resolve(raw) {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(QueryError::UnknownUser(raw.to_string())),
            Err(e) => {
                tracing::error!("identity lookup failed for {raw}: {e:#}");
                Err(QueryError::Store(format!("{e:#}")))
            }
        }
    }
}

fn store_error(e: anyhow::Error) -> QueryError {
    tracing::error!("store failure: {e:#}");
    QueryError::Store(format!("{e:#}"))
}

fn send_reply<T>(
    sender: tokio::sync::oneshot::Sender<QueryReply<T>>,
    reply: QueryReply<T>,
) {
    if sender.send(reply).is_err() {
        tracing::warn!("query requester dropped before the reply was sent");
    }
}
