//! Sleep Timer - a durable single-slot countdown that pauses playback
//!
//! This is the main entry point for the sleep-timer daemon.

use std::sync::Arc;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};

use sleep_timer::{
    api::create_router,
    config::Config,
    engine::TimerEngine,
    services::{
        check_command_available, ActionPorts, ChannelBroadcaster, DesktopNotifier, LogNotifier,
        NotifyAction, PlayerctlController,
    },
    state::AppState,
    store::{DurableStore, JsonFileStore, TimerRepository},
    tasks::wake_dispatch_task,
    utils::{shutdown_signal, SystemClock},
    wake::TokioWakePort,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("sleep_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting sleep-timer server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, state_file={}, keepalive={}s",
        config.host,
        config.port,
        config.state_file.display(),
        config.keepalive_secs
    );

    // The player client is needed for every timer; warn early rather than at expiry
    if let Err(e) = check_command_available(&config.player_command).await {
        warn!("{}; timers will not be able to pause playback", e);
    }

    let clock = Arc::new(SystemClock);
    let store: Arc<dyn DurableStore> = Arc::new(JsonFileStore::new(&config.state_file));

    let (wake_tx, wake_rx) = mpsc::channel(64);
    let wake = Arc::new(TokioWakePort::new(wake_tx, Arc::clone(&store), clock.clone()));

    let player = Arc::new(PlayerctlController::new(&config.player_command));
    let notify: Arc<dyn NotifyAction> = if config.no_notify {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DesktopNotifier::new(&config.notify_command))
    };
    let broadcaster = Arc::new(ChannelBroadcaster::default());
    let ports = ActionPorts {
        resources: player.clone(),
        pause: player,
        notify,
        broadcast: broadcaster.clone(),
    };

    let engine = TimerEngine::new(
        TimerRepository::new(Arc::clone(&store)),
        wake.clone(),
        ports,
        clock,
        config.engine_settings(),
    );

    // Wakes armed by a previous process come back first, then the stored
    // record decides whether they are still wanted
    match wake.restore().await {
        Ok(0) => {}
        Ok(n) => info!("Restored {} wake alarms", n),
        Err(e) => warn!("Failed to restore wake alarms: {}", e),
    }
    match engine.reconcile().await {
        Ok(snapshot) => info!("Recovered timer state: active={}", snapshot.active),
        Err(e) => warn!("Startup reconciliation failed: {}", e),
    }

    // Start the wake dispatch background task
    tokio::spawn(wake_dispatch_task(Arc::clone(&engine), wake_rx));

    let state = Arc::new(AppState::new(engine, broadcaster, config.port, config.host.clone()));

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /timer/start   - Start a timer {{durationSeconds, resourceId, category?}}");
    info!("  POST /timer/stop    - Cancel the timer");
    info!("  POST /timer/pause   - Pause the countdown");
    info!("  POST /timer/resume  - Resume the countdown");
    info!("  POST /timer/extend  - Add time {{additionalSeconds}}");
    info!("  GET  /timer/status  - Current timer snapshot");
    info!("  GET  /health        - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // The timer keeps its deadline in the state file; the next start picks it up
    info!("Server shutdown complete");
    Ok(())
}
