//! mayfly-web — the relay sessions sync through.
//! Rooms keyed by session code: REST append, WebSocket snapshot streams.

mod server;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use mayfly_core::store::MemoryStore;

use server::AppState;

/// Rooms untouched this long get dropped, closing their subscribers.
const ROOM_MAX_IDLE: Duration = Duration::from_secs(3600);

/// How often the sweeper looks for idle rooms.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let state = Arc::new(AppState {
        store: Arc::new(MemoryStore::new()),
    });

    // Idle-room sweeper — the relay holds nothing forever
    {
        let store = Arc::clone(&state.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let swept = store.sweep_idle(ROOM_MAX_IDLE).await;
                if swept > 0 {
                    info!("swept {} idle room(s)", swept);
                }
            }
        });
    }

    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8787);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind port");

    eprintln!("\n  mayfly relay listening on http://localhost:{}\n", port);

    // Graceful shutdown on Ctrl+C
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("Relay stopped.");
}
