//! Documentation of the rollcall attendance backend.
//!
//! Attendance tracking for volunteer organizations: members check in to
//! recurring appointments by typing the current code from their
//! authenticator app, no staff supervision needed.
//!
//!
//!
//! # General Infrastructure
//! - Frontend and staff tooling talk to this backend through a reverse proxy
//! - The proxy owns TLS, sessions and staff authorization; this backend
//!   assumes requests that reach the review/boundary routes were vetted
//! - Redis runs next to the backend and holds members, schedules, attendance
//!   records and absence exceptions
//!
//!
//!
//! # Verification Flow
//!
//! - Member is created with a group, then enrolls via `POST /regenerate`
//! - `GET /qr` hands out the `otpauth://` payload exactly once; the member
//!   scans it into their authenticator app
//! - `POST /checkin` takes `{identifier, code}`: the rate limiter runs
//!   first, then the code is verified against the stored secret, then the
//!   check-in is attributed to the nearest appointment within the tolerance
//!   window
//! - No matching appointment is not an error, the event is stored as
//!   `unmatched` for manual reconciliation
//! - An approved absence exception for the matched appointment flags the
//!   record for review instead of dropping either side
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! Everything the verification flow touches is small and key-shaped, so an
//! in-memory store with atomic single-key operations fits: `HSETNX` claims
//! the one provisioning view of a secret, `SET NX` collapses concurrent
//! duplicate check-ins, `INCR` allocates exception ids. Rate-limit windows
//! stay in-process behind a mutex; run a single backend process, or move
//! the windows into Redis before scaling out.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against a local Redis.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo run
//! ```
//!
//! All tunables (TOTP period/digits/window, rate limits, check-in tolerance)
//! are environment variables read once at startup, see `config.rs`.
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod checkin;
pub mod config;
pub mod database;
pub mod error;
pub mod exceptions;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod totp;
pub mod utils;

use routes::{
    create_member_handler, file_exception_handler, put_appointments_handler,
    qr_verification_handler, regenerate_token_handler, review_exception_handler,
    totp_checkin_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/checkin", post(totp_checkin_handler))
        .route("/regenerate", post(regenerate_token_handler))
        .route("/qr", get(qr_verification_handler))
        .route("/members", post(create_member_handler))
        .route("/appointments", post(put_appointments_handler))
        .route("/exceptions", post(file_exception_handler))
        .route("/exceptions/review", post(review_exception_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
