use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gifttt::cli;
use gifttt::clock::Clock;
use gifttt::config::Config;
use gifttt::dispatch::{DependencyIndex, Dispatcher, Engine};
use gifttt::rule;
use gifttt::store::SqliteBackend;
use gifttt::var::VarStore;

#[tokio::main]
async fn main() {
    let config = Config::from_args(cli::parse_args());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    // ── Store (fatal if it cannot be opened) ──────────────────────────────────
    let backend = match SqliteBackend::open(&config.db_path) {
        Ok(b) => b,
        Err(e) => {
            error!(path = %config.db_path.display(), error = %e, "cannot open database");
            std::process::exit(1);
        }
    };
    info!(path = %backend.path().display(), "database opened");
    let (store, queue) = VarStore::new(Arc::new(backend));
    let store = Arc::new(store);

    // ── Rules ─────────────────────────────────────────────────────────────────
    let rules = match rule::discover(&config.rule_dir, &config.suffix) {
        Ok(r) => r,
        Err(e) => {
            error!(dir = %config.rule_dir.display(), error = %e, "cannot read rule directory");
            std::process::exit(1);
        }
    };
    let index = DependencyIndex::build(rules);
    info!(rules = index.rule_count(), variables = index.len(), "rules loaded");

    // ── Run until interrupted ─────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::new(index, Arc::clone(&store)));
    let clock = Clock::new(Arc::clone(&store), config.tick);
    let engine = Engine::start(dispatcher, queue, Some(clock));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot wait for ctrl-c");
    }
    info!("shutting down");
    engine.shutdown().await;
}
