use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

mod access_loop;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("wardend starting");

    let config = config::Config::load()?;
    tracing::info!(
        device_id = %config.device_id,
        camera = %config.camera_device,
        threshold = config.acceptance_threshold,
        max_attempts = config.max_attempts,
        "configuration loaded"
    );

    // Bounded wait for connectivity; on timeout the loop still runs and
    // dispatch fails until the link comes back. Detached so Ctrl-C can exit
    // without it.
    if let Some(addr) = config.link_probe() {
        let timeout = config.link_timeout();
        let (link_tx, link_rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("warden-link".into())
            .spawn(move || {
                let _ = link_tx.send(warden_notify::wait_for_link(&addr, timeout));
            })?;
        if unless_interrupted(link_rx, tokio::signal::ctrl_c()).await?.is_none() {
            tracing::info!("interrupted while waiting for network link");
            return Ok(());
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let (loop_thread, ready) = access_loop::spawn(config, Arc::clone(&shutdown))?;
    match unless_interrupted(ready, tokio::signal::ctrl_c()).await? {
        Some(ready) => ready.map_err(|_| anyhow!("access loop exited during startup"))??,
        None => {
            // The loop thread sees the flag once startup finishes; exit does not wait for it.
            tracing::info!("interrupted during startup");
            shutdown.store(true, Ordering::Relaxed);
            return Ok(());
        }
    }

    tracing::info!("wardend ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("wardend shutting down");
    shutdown.store(true, Ordering::Relaxed);

    tokio::task::spawn_blocking(move || loop_thread.join())
        .await?
        .map_err(|_| anyhow!("access loop panicked"))?;

    Ok(())
}

/// Drive `task` to completion unless `interrupt` resolves first, in which
/// case `None` is returned and `task` is dropped.
async fn unless_interrupted<T>(
    task: impl Future<Output = T>,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> Result<Option<T>> {
    tokio::select! {
        out = task => Ok(Some(out)),
        signal = interrupt => {
            signal?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready};

    #[tokio::test]
    async fn test_interrupt_during_wait_returns_none() {
        let out = unless_interrupted(pending::<()>(), ready(Ok(()))).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_task_finishes_without_interrupt() {
        let out = unless_interrupted(ready(7), pending()).await.unwrap();
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn test_interrupt_during_startup_handshake() {
        let (_ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let out = unless_interrupted(ready_rx, ready(Ok(()))).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_signal_setup_failure_propagates() {
        let failed = ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler")));
        assert!(unless_interrupted(pending::<()>(), failed).await.is_err());
    }
}
