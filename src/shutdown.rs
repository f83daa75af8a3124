// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Shutdown Hook
//!
//! A running consumer stops when its handler asks for it or when the process
//! is asked to shut down. `Shutdown` is the second path: by default it waits
//! for Ctrl-C or SIGTERM, embedders can drive it through a watch channel.

use tokio::sync::watch;
use tracing::warn;

/// Tells a running consumer when the process wants it to stop.
#[derive(Debug, Clone, Default)]
pub enum Shutdown {
    /// Ctrl-C, or SIGTERM on unix.
    #[default]
    Signal,
    /// Fires once the channel holds `true`.
    Channel(watch::Receiver<bool>),
    /// Never fires.
    Never,
}

impl Shutdown {
    /// Shutdown driven by the embedder.
    ///
    /// # Parameters
    /// * `rx` - Receiver of a watch channel; sending `true` requests shutdown
    pub fn channel(rx: watch::Receiver<bool>) -> Shutdown {
        Shutdown::Channel(rx)
    }

    /// Shutdown that never fires, for consumers stopped by their handlers only.
    pub fn never() -> Shutdown {
        Shutdown::Never
    }

    /// Resolves when shutdown was requested.
    pub async fn requested(&mut self) {
        match self {
            Shutdown::Signal => wait_for_signal().await,
            Shutdown::Channel(rx) => {
                // a dropped sender can no longer request anything
                if rx.wait_for(|requested| *requested).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            Shutdown::Never => std::future::pending::<()>().await,
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            warn!(error = err.to_string(), "failure to install SIGTERM handler");
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = err.to_string(), "failure to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                warn!(error = err.to_string(), "failure to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = err.to_string(), "failure to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
