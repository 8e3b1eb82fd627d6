//! Server runner
//!
//! Binds the listener, spawns one session task per connection and a
//! background saver, and coordinates shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::config::ServerConfig;
use super::coordinator::Coordinator;
use super::persistence::{FileRepository, SheetRepository};
use super::session::run_session;
use crate::error::SheetResult;

/// How long sessions get to flush their queues once shutdown begins.
const SESSION_DRAIN_GRACE: Duration = Duration::from_secs(2);

pub struct SheetServer {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    save_interval: Duration,
}

impl SheetServer {
    /// Load persisted state from `config.data_dir` and bind the listener.
    pub async fn bind(config: &ServerConfig) -> SheetResult<Self> {
        let repository: Arc<dyn SheetRepository> =
            Arc::new(FileRepository::open(&config.data_dir)?);
        Self::bind_with(config, repository).await
    }

    pub async fn bind_with(
        config: &ServerConfig,
        repository: Arc<dyn SheetRepository>,
    ) -> SheetResult<Self> {
        let coordinator = Arc::new(Coordinator::load(repository)?);
        let listener = TcpListener::bind(config.address()).await?;
        info!(
            address = %listener.local_addr()?,
            sheets = coordinator.sheet_names().len(),
            "spreadsheet server listening"
        );
        Ok(Self {
            listener,
            coordinator,
            save_interval: config.save_interval(),
        })
    }

    pub fn local_addr(&self) -> SheetResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Serve until SIGINT/SIGTERM or an admin `close`.
    pub async fn run(self) -> SheetResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `signal` resolves or an admin `close`.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> SheetResult<()> {
        let SheetServer {
            listener,
            coordinator,
            save_interval,
        } = self;

        let mut stop = coordinator.stop_signal();
        let saver = tokio::spawn(run_saver(
            Arc::clone(&coordinator),
            save_interval,
            coordinator.stop_signal(),
        ));
        let mut sessions = JoinSet::new();

        tokio::pin!(signal);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        sessions.spawn(run_session(Arc::clone(&coordinator), stream, peer));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                _ = stop.changed() => break,
                () = &mut signal => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        let closing = Arc::clone(&coordinator);
        if let Err(e) = tokio::task::spawn_blocking(move || closing.shutdown()).await {
            error!(error = %e, "coordinator shutdown failed");
        }

        let drained = tokio::time::timeout(SESSION_DRAIN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = sessions.len(), "aborting sessions that did not close in time");
            sessions.shutdown().await;
        }

        if let Err(e) = saver.await {
            error!(error = %e, "saver task failed");
        }

        info!("spreadsheet server stopped");
        Ok(())
    }
}

/// Periodically save dirty sheets until the stop signal, then run one last
/// cycle.
async fn run_saver(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while !*stop.borrow() {
        tokio::select! {
            _ = ticker.tick() => save_cycle(&coordinator).await,
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    save_cycle(&coordinator).await;
}

async fn save_cycle(coordinator: &Arc<Coordinator>) {
    let coordinator = Arc::clone(coordinator);
    if let Err(e) = tokio::task::spawn_blocking(move || coordinator.persist_dirty()).await {
        error!(error = %e, "save cycle panicked");
    }
}

/// Graceful shutdown signal handler
///
/// # Coverage Exclusion
/// Waits for OS signals - cannot unit test
#[cfg(not(coverage))]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Stub for coverage builds: serve until an admin `close`.
#[cfg(coverage)]
async fn shutdown_signal() {
    std::future::pending::<()>().await;
}
