//! `overseer` binary: store, control plane, HTTP API and the session sweeper.

mod api;
mod cli;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use overseer_auth::ControlPlane;
use overseer_core::models::operator::{CreateOperator, OperatorRole};
use overseer_core::repository::OperatorRepository;
use overseer_db::repository::{
    SurrealAuditLogRepository, SurrealImpersonationRepository, SurrealOperatorRepository,
    SurrealSessionRepository, SurrealTenantRepository,
};
use overseer_db::DbManager;
use surrealdb::Connection;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{AppState, Plane};
use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("overseer=info")),
        )
        .json()
        .init();

    let args = Args::parse();
    info!("Starting Overseer server...");

    let auth_config = args.auth_config()?;
    let db = DbManager::open(&args.db_config())
        .await
        .context("failed to open the store")?;

    let client = db.client().clone();
    let operators = match &args.pepper {
        Some(pepper) => SurrealOperatorRepository::with_pepper(client.clone(), pepper.clone()),
        None => SurrealOperatorRepository::new(client.clone()),
    };
    bootstrap_owner(&operators, &args).await?;

    let plane = Arc::new(ControlPlane::new(
        operators,
        SurrealSessionRepository::new(client.clone()),
        SurrealImpersonationRepository::new(client.clone()),
        SurrealTenantRepository::new(client.clone()),
        SurrealAuditLogRepository::new(client),
        auth_config,
    ));

    let sweeper = tokio::spawn(sweep_sessions(Arc::clone(&plane), args.sweep_interval()));

    let app = api::router(AppState {
        plane,
        trusted_proxy: args.trusted_proxy,
    });
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(addr = %args.listen, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    sweeper.abort();
    if let Err(e) = db.close().await {
        warn!(error = %e, "failed to close the store cleanly");
    }

    info!("Overseer server stopped.");
    Ok(())
}

/// Create the first Owner when the operator table is empty.
async fn bootstrap_owner<C: Connection>(
    operators: &SurrealOperatorRepository<C>,
    args: &Args,
) -> Result<()> {
    if operators.count().await? > 0 {
        return Ok(());
    }
    let (Some(email), Some(password)) = (&args.bootstrap_email, &args.bootstrap_password) else {
        warn!("no operators exist and no bootstrap owner is configured");
        return Ok(());
    };

    let owner = operators
        .create(CreateOperator {
            email: email.clone(),
            password: password.clone(),
            role: OperatorRole::Owner,
            allowed_ips: vec![],
        })
        .await
        .context("failed to create bootstrap owner")?;
    warn!(
        operator_id = %owner.id,
        "bootstrap owner created with an empty IP allowlist"
    );
    Ok(())
}

async fn sweep_sessions<C: Connection>(plane: Arc<Plane<C>>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match plane.sweep_expired_sessions().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "swept expired sessions"),
            Err(e) => error!(error = %e, "session sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Gracefully shutting down");
}
