use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::lifecycle::EngineManager;
use crate::error::Result;

/// Background thread that releases the engine once it has been idle.
///
/// Stopping wakes the thread immediately instead of waiting out the
/// current interval. Dropping the monitor stops it.
pub struct IdleMonitor {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl IdleMonitor {
    pub fn spawn(manager: Arc<EngineManager>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("stt-idle-monitor".to_string())
            .spawn(move || {
                debug!("Idle monitor started, checking every {}s", interval.as_secs());
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(err) = manager.release_if_idle(Instant::now()) {
                                warn!("Idle check failed: {}", err);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Idle monitor exiting");
            })?;

        info!("Model timeout monitor started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    /// Wake and join the monitor thread. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Idle monitor thread panicked");
            } else {
                info!("Model timeout monitor stopped");
            }
        }
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::engine::lifecycle::tests::CountingLoader;

    #[test]
    fn monitor_releases_idle_engine() {
        let loader = CountingLoader::default();
        let manager = Arc::new(EngineManager::new(
            Box::new(loader.clone()),
            Duration::from_millis(20),
        ));
        drop(manager.acquire().unwrap());

        let mut monitor = IdleMonitor::spawn(manager.clone(), Duration::from_millis(10)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.is_loaded() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        monitor.stop();

        assert!(!manager.is_loaded());
        assert_eq!(loader.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_does_not_wait_for_the_interval() {
        let manager = Arc::new(EngineManager::new(
            Box::new(CountingLoader::default()),
            Duration::from_secs(600),
        ));
        let mut monitor = IdleMonitor::spawn(manager, Duration::from_secs(60)).unwrap();
        assert!(monitor.is_running());

        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!monitor.is_running());

        monitor.stop();
    }
}
