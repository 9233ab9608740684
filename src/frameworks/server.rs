// Framework bootstrap for the game server runtime.

use crate::domain::ports::BalanceLedger;
use crate::frameworks::{config, db};
use crate::interface_adapters::ledger::PostgresLedger;
use crate::interface_adapters::routes::app;
use crate::interface_adapters::state::{AppState, SystemClock, ThreadRngDice};
use crate::use_cases::{PresenceMap, RoomDeps, RoomRegistry, RoomSettings};

use std::io::Result;
use std::net::SocketAddr;
use std::sync::Arc;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener, state: Arc<AppState>) -> Result<()> {
    let address = listener.local_addr()?;
    let app = app(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let state = build_state().await?;

    let address = SocketAddr::from(([0, 0, 0, 0], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener, state).await
}

async fn build_state() -> Result<Arc<AppState>> {
    let database_url = config::database_url()
        .ok_or_else(|| std::io::Error::other("DATABASE_URL must be set"))?;
    let pool = db::connect_pool(&database_url)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to connect to database: {e}")))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to run migrations: {e}")))?;
    tracing::debug!("database pool ready");

    let ledger: Arc<dyn BalanceLedger> = Arc::new(PostgresLedger::new(pool));
    let betting_window = config::betting_window();

    // Room Registry
    // This owns the set of active room tasks.
    let registry = Arc::new(RoomRegistry::new(
        RoomSettings {
            command_channel_capacity: config::COMMAND_CHANNEL_CAPACITY,
            events_broadcast_capacity: config::EVENTS_BROADCAST_CAPACITY,
        },
        RoomDeps {
            ledger: ledger.clone(),
            clock: Arc::new(SystemClock),
            dice: Arc::new(ThreadRngDice),
            betting_window,
        },
    ));

    Ok(Arc::new(AppState {
        registry,
        presence: Arc::new(PresenceMap::new()),
        ledger,
    }))
}
