pub mod app;

pub mod game;

pub mod ledger;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
