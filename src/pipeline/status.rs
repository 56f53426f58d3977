// src/pipeline/status.rs

//! Polls the status side-channel file while a pipeline runs.
//!
//! Long-running tools inside the environment overwrite a single-line file
//! with their current coarse progress. The monitor reads it every
//! `interval`, logs changes and publishes the latest message on a
//! `watch` channel.
//!
//! Give the monitor its own driver instance: its polling would otherwise
//! replace the pipeline driver's "last execution".

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::SharedDriver;
use crate::errors::DriverError;
use crate::exec::DEFAULT_POLL_INTERVAL;

/// Environment-local status file.
pub const STATUS_FILE: &str = "/usr/local/bin/status.txt";

/// Written by the analysis when it had to skip a file.
pub const READCOUNT_WARNING: &str = "WARNING: Readcount failed for a file. Process continues...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message: String,
    pub warning: bool,
}

impl StatusUpdate {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let warning = message == READCOUNT_WARNING;
        Self { message, warning }
    }
}

#[derive(Debug)]
pub struct StatusMonitor {
    driver: SharedDriver,
    path: String,
    interval: Duration,
}

impl StatusMonitor {
    pub fn new(driver: SharedDriver) -> Self {
        Self {
            driver,
            path: STATUS_FILE.to_string(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current status message, if the file exists and is not empty.
    pub async fn read_once(&self) -> Result<Option<String>, DriverError> {
        let cmd = format!("cat \"{}\"", self.path);
        let (result, output) = self.driver.run_captured(&cmd).await?;
        if !result.success() {
            return Ok(None);
        }
        let text = output.stdout().text();
        let message = text.trim();
        Ok((!message.is_empty()).then(|| message.to_string()))
    }

    /// Start polling in the background.
    pub fn spawn(self) -> StatusHandle {
        let (tx, rx) = watch::channel(None);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            debug!(path = %self.path, "status monitor started");
            let mut last: Option<String> = None;
            loop {
                match self.read_once().await {
                    Ok(Some(message)) if last.as_deref() != Some(message.as_str()) => {
                        let update = StatusUpdate::new(message.clone());
                        if update.warning {
                            warn!(status = %update.message, "analysis reported a warning");
                        } else {
                            info!(status = %update.message, "status changed");
                        }
                        tx.send_replace(Some(update));
                        last = Some(message);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "reading status file failed"),
                }

                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            debug!("status monitor stopped");
        });

        StatusHandle {
            updates: rx,
            stop: Some(stop_tx),
            handle,
        }
    }
}

/// Running [`StatusMonitor`].
#[derive(Debug)]
pub struct StatusHandle {
    updates: watch::Receiver<Option<StatusUpdate>>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl StatusHandle {
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusUpdate>> {
        self.updates.clone()
    }

    pub fn current(&self) -> Option<StatusUpdate> {
        self.updates.borrow().clone()
    }

    /// Stop polling and wait for the loop to end.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            // Err means the loop already ended.
            let _ = stop.send(());
        }
        if let Err(e) = self.handle.await {
            debug!(error = %e, "status monitor task ended abnormally");
        }
    }
}
