//! Service entry point — wires config, store, catalogue, gateway, and the
//! axum router, then serves until shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;

use loanmatch::advisor::{Orchestrator, SessionStore};
use loanmatch::api::{build_router, AppState};
use loanmatch::config::AppConfig;
use loanmatch::llm::{LlmGateway, TextGenerator};
use loanmatch::ratelimit::RateLimiter;
use loanmatch::scoring::{LenderCatalogue, ScoringEngine};

/// How often the background sweep flips expired sessions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;
    loanmatch::init_tracing(&config.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        database = %config.database_path,
        model = %config.llm.model,
        neural = config.neural_scoring_enabled,
        "=== loanmatch starting ==="
    );

    let store = Arc::new(Mutex::new(
        SessionStore::open(&config.database_path).context("opening session store")?,
    ));

    let catalogue = Arc::new(if config.lender_seed_path.is_empty() {
        LenderCatalogue::load_embedded().context("loading embedded lender seed")?
    } else {
        LenderCatalogue::load_from_path(&config.lender_seed_path)
            .with_context(|| format!("loading lender seed {}", config.lender_seed_path))?
    });
    tracing::info!(lenders = catalogue.len(), "lender catalogue loaded");

    let engine = Arc::new(ScoringEngine::new(
        Arc::clone(&catalogue),
        config.neural_scoring_enabled,
        &config.neural_model_path,
        &config.neural_scaler_path,
        config.currency_symbol.clone(),
    ));

    let gateway: Arc<dyn TextGenerator> =
        Arc::new(LlmGateway::new(config.llm.clone()).context("building LLM gateway")?);

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        Arc::clone(&engine),
    ));

    // Background expiry sweep: log and continue on failure.
    let sweep_store = Arc::clone(&store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let result = sweep_store
                .lock()
                .map_err(|_| "store lock poisoned".to_string())
                .and_then(|store| store.sweep_expired().map_err(|e| e.to_string()));
            match result {
                Ok(0) => {}
                Ok(swept) => tracing::info!(swept, "expired sessions swept"),
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
    });

    let state = AppState {
        store,
        orchestrator,
        engine,
        catalogue,
        limiter: Arc::new(RateLimiter::new()),
        gateway,
        started_at: Instant::now(),
    };

    let app = build_router(state, &config);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
