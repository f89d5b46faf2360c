use anyhow::Context;
use clap::Parser;
use pipbib::{
    app::{
        App,
        DEFAULT_HISTORY_LIMIT,
        RunState,
        actix_api::ActixQueryApi,
        extractor::HttpExtractor,
        identity::AllowListIdentity,
        init_tracing,
        sled_store,
    },
    game::RandomDie,
    ledger::Ledger,
};
use std::{
    fs,
    path::PathBuf,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port for the query API; picks a free port when omitted
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the sled database
    #[arg(long, default_value = "pipbib_data")]
    data_dir: PathBuf,

    /// Restrict play to these user ids; everyone is allowed when omitted
    #[arg(long = "allow-user")]
    allow_users: Vec<String>,

    /// History entries returned per request by default
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

async fn handle_interrupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }

    fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("create data directory {}", args.data_dir.display())
    })?;
    tracing::info!(
        "Using sled storage directory: {}",
        args.data_dir.display()
    );
    let (balances, games) = sled_store::open(&args.data_dir)?;

    let identity = if args.allow_users.is_empty() {
        AllowListIdentity::open()
    } else {
        AllowListIdentity::restricted_to(args.allow_users.clone())
    };
    let extractor = HttpExtractor::new()?;
    let api = ActixQueryApi::new(args.port).await?;
    tracing::info!("Pipbib serving on {}", api.base_url());

    let mut app = App::new(
        api,
        Ledger::new(balances, games),
        extractor,
        RandomDie,
        identity,
        args.history_limit,
    );

    tracing::info!("Starting wager service");
    loop {
        let interrupt = handle_interrupt();
        match app.run(interrupt).await? {
            RunState::Continue => continue,
            RunState::Exit => {
                tracing::info!("Exiting wager service");
                return Ok(());
            }
        }
    }
}
