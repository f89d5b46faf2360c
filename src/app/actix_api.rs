use crate::{
    Result,
    app::query_api::{
        BalanceQuery,
        HistoryQuery,
        ProductQuery,
        Query,
        QueryAPI,
        QueryError,
        QueryReply,
        WagerQuery,
    },
    game::ProductInfo,
    ledger::{
        GameRecord,
        UserBalance,
        WagerReceipt,
    },
};
use actix_cors::Cors;
use actix_web::{
    App,
    HttpServer,
    dev::ServerHandle,
    error::{
        ErrorBadRequest,
        ErrorInternalServerError,
        ErrorUnauthorized,
        ErrorUnprocessableEntity,
    },
    web,
};
use anyhow::{
    Context,
    anyhow,
};
use serde::Deserialize;
use std::{
    net::TcpListener,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductLookupDto {
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    manual_price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WagerDto {
    user: String,
    product: ProductInfo,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

/// HTTP front for the app actor. Each request becomes a `Query` with a
/// oneshot responder; the browser UI polls these endpoints and re-reads state
/// after every wager.
pub struct ActixQueryApi {
    receiver: mpsc::Receiver<Query>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixQueryApi {
    pub async fn new(port: Option<u16>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(16);

        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for query API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("query API listening on {}", base_url);

        let server_sender = sender.clone();
        let server = HttpServer::new(move || {
            let sender = server_sender.clone();
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(sender))
                .route("/balance/{user}", web::get().to(handle_balance))
                .route("/history/{user}", web::get().to(handle_history))
                .route("/product", web::post().to(handle_product))
                .route("/wager", web::post().to(handle_wager))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl QueryAPI for ActixQueryApi {
    async fn query(&mut self) -> Result<Query> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("query server closed"))
    }
}

impl Drop for ActixQueryApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle_balance(
    sender: web::Data<mpsc::Sender<Query>>,
    user: web::Path<String>,
) -> actix_web::Result<web::Json<UserBalance>> {
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::Balance(BalanceQuery {
        user: user.into_inner(),
        sender: response_sender,
    });
    forward(&sender, query, response_receiver).await
}

async fn handle_history(
    sender: web::Data<mpsc::Sender<Query>>,
    user: web::Path<String>,
    params: web::Query<HistoryParams>,
) -> actix_web::Result<web::Json<Vec<GameRecord>>> {
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::History(HistoryQuery {
        user: user.into_inner(),
        limit: params.limit,
        sender: response_sender,
    });
    forward(&sender, query, response_receiver).await
}

async fn handle_product(
    sender: web::Data<mpsc::Sender<Query>>,
    body: web::Json<ProductLookupDto>,
) -> actix_web::Result<web::Json<ProductInfo>> {
    let (response_sender, response_receiver) = oneshot::channel();
    let body = body.into_inner();
    let query = Query::Product(ProductQuery {
        url: body.url,
        name: body.name,
        manual_price: body.manual_price,
        sender: response_sender,
    });
    forward(&sender, query, response_receiver).await
}

async fn handle_wager(
    sender: web::Data<mpsc::Sender<Query>>,
    body: web::Json<WagerDto>,
) -> actix_web::Result<web::Json<WagerReceipt>> {
    let (response_sender, response_receiver) = oneshot::channel();
    let body = body.into_inner();
    let query = Query::Wager(WagerQuery {
        user: body.user,
        product: body.product,
        sender: response_sender,
    });
    forward(&sender, query, response_receiver).await
}

async fn forward<T>(
    sender: &web::Data<mpsc::Sender<Query>>,
    query: Query,
    response_receiver: oneshot::Receiver<QueryReply<T>>,
) -> actix_web::Result<web::Json<T>> {
    sender
        .get_ref()
        .clone()
        .send(query)
        .await
        .map_err(|_| ErrorInternalServerError("unable to forward query"))?;

    let reply = response_receiver
        .await
        .map_err(|_| ErrorInternalServerError("query responder dropped"))?;

    match reply {
        Ok(value) => Ok(web::Json(value)),
        Err(e) => Err(error_response(e)),
    }
}

fn error_response(e: QueryError) -> actix_web::Error {
    let message = e.to_string();
    match e {
        QueryError::UnknownUser(_) => ErrorUnauthorized(message),
        QueryError::InvalidUrl(_) | QueryError::InvalidPrice(_) => {
            ErrorBadRequest(message)
        }
        QueryError::InsufficientBalance { .. } => {
            ErrorUnprocessableEntity(message)
        }
        QueryError::Store(_) => ErrorInternalServerError(message),
    }
}
