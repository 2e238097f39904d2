//! Background polling loop.
//!
//! [`ScanThread`] runs [`QpdScanner::scan`] on a dedicated OS thread until told
//! to stop and publishes every result on a broadcast channel. The loop body
//! blocks on the camera, so it does not run on the async runtime.
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped --start_scan()--> Running --stop_scan()--> Stopped
//!                              |
//!                              +--acquisition failure--> Stopped (error kept for stop_scan)
//! ```
//!
//! Cancellation is cooperative: the running flag is checked between
//! aggregation cycles, so `stop_scan` waits for the cycle in flight and
//! nothing is published after it returns.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{QpdScanner, QpdUpdate};
use crate::error::{AppResult, QpdError};

/// Owner of the polling loop worker
pub struct ScanThread {
    scanner: Arc<Mutex<QpdScanner>>,
    running: Arc<AtomicBool>,
    updates: broadcast::Sender<QpdUpdate>,
    worker: Mutex<Option<JoinHandle<AppResult<()>>>>,
}

impl ScanThread {
    /// Create a stopped loop for `scanner`, buffering up to `capacity`
    /// updates per subscriber.
    pub fn new(scanner: Arc<Mutex<QpdScanner>>, capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            scanner,
            running: Arc::new(AtomicBool::new(false)),
            updates,
            worker: Mutex::new(None),
        }
    }

    /// Receive every update published from now on.
    ///
    /// A subscriber that falls more than `capacity` updates behind skips the
    /// oldest ones (`RecvError::Lagged`); the loop never waits for consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<QpdUpdate> {
        self.updates.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the loop. Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// `Io` if the worker thread cannot be spawned.
    pub fn start_scan(&self) -> AppResult<()> {
        let mut worker = self.worker.lock();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan loop already running");
            return Ok(());
        }

        // A worker that ended on its own is reaped before starting over.
        if let Some(finished) = worker.take() {
            match finished.join() {
                Ok(Err(e)) => warn!(error = %e, "Previous scan loop had failed"),
                Ok(Ok(())) => {}
                Err(_) => warn!("Previous scan loop panicked"),
            }
        }

        let scanner = Arc::clone(&self.scanner);
        let running = Arc::clone(&self.running);
        let updates = self.updates.clone();
        let spawned = std::thread::Builder::new()
            .name("qpd-scan".into())
            .spawn(move || run_loop(&scanner, &running, &updates));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Stop the loop and wait for the cycle in flight to finish.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop, if it died on its own, and
    /// `ScanThreadPanicked` if the worker panicked.
    pub fn stop_scan(&self) -> AppResult<()> {
        let mut worker = self.worker.lock();
        self.running.store(false, Ordering::Release);
        match worker.take() {
            Some(handle) => handle.join().map_err(|_| QpdError::ScanThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for ScanThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop_scan() {
            warn!(error = %e, "Scan loop ended with an error");
        }
    }
}

fn run_loop(
    scanner: &Mutex<QpdScanner>,
    running: &AtomicBool,
    updates: &broadcast::Sender<QpdUpdate>,
) -> AppResult<()> {
    info!("Scan loop started");
    let mut cycles: u64 = 0;

    while running.load(Ordering::Acquire) {
        let scanned = {
            let mut scanner = scanner.lock();
            let units = scanner.settings().units_to_microns;
            scanner.scan().map(|result| QpdUpdate::from_result(&result, units))
        };

        match scanned {
            Ok(update) => {
                cycles += 1;
                debug!(
                    cycle = cycles,
                    is_good = update.is_good,
                    offset = update.offset,
                    sum = update.sum,
                    "Publishing QPD update"
                );
                // No receivers is fine; the next subscriber starts fresh.
                let _ = updates.send(update);
            }
            Err(e) => {
                error!(error = %e, cycles, "Scan loop stopped");
                running.store(false, Ordering::Release);
                return Err(e);
            }
        }
    }

    info!(cycles, "Scan loop stopped");
    Ok(())
}
