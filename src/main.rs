mod api;
mod clock;
mod config;
mod error;
mod fetcher;
mod proxy;
mod state;
mod sync;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{FetchClient, HttpTransport, Transport};
use crate::proxy::edge::log_startup;
use crate::proxy::{EdgeProxy, ImageProxy, TableBoard};
use crate::state::response_cache::run_sweeper;
use crate::state::ResponseCache;
use crate::sync::{scheduler, SyncEngine};
use crate::types::FavoriteTeam;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());

    // --- Edge proxy: cache store, API proxy, image proxy, standings ---
    let cache = ResponseCache::new(Arc::clone(&clock), cfg.cache_max_entries);
    let edge = EdgeProxy::new(&cfg, Arc::clone(&cache), Arc::clone(&latency))?;
    let image = Arc::new(ImageProxy::new(Arc::clone(&edge), cfg.image_host_suffix.clone()));
    let tables = TableBoard::new(Arc::clone(&edge), cfg.leagues.clone(), Arc::clone(&clock));
    log_startup(&cfg);

    tokio::spawn(run_sweeper(Arc::clone(&cache)));

    if cfg.table_warm_enabled {
        tokio::spawn(Arc::clone(&tables).run_warmer());
    }

    // --- Sync engine: in-process proxy unless a remote one is configured ---
    let transport: Arc<dyn Transport> = match &cfg.proxy_base_url {
        Some(base) => {
            info!(proxy = %base, "[FETCH] using remote proxy");
            Arc::new(HttpTransport::new(base, cfg.upstream_timeout_secs)?)
        }
        None => Arc::clone(&edge) as Arc<dyn Transport>,
    };
    let favorite = FavoriteTeam {
        id: cfg.favorite_team_id.clone(),
        name: cfg.favorite_team_name.clone(),
    };
    let engine = SyncEngine::new(
        FetchClient::new(transport, Arc::clone(&clock)),
        Arc::clone(&clock),
        cfg.leagues.clone(),
        favorite,
        Arc::clone(&health),
    );

    if cfg.sync_enabled {
        tokio::spawn(scheduler::run(Arc::clone(&engine)));
    } else {
        info!("[SCHED] SYNC_ENABLED=false, cycles run only on request");
    }

    // --- HTTP API server ---
    let api_state = ApiState { edge, image, tables, engine, health, latency };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        leagues = cfg.leagues.len(),
        "HTTP API listening on {bind_addr}"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
