//! Engine lifecycle: lazy load on first use, release after idling.
//!
//! The engine slot lives behind one mutex. Acquisition, inference, the idle
//! check and reloads all go through it, so the monitor can never release an
//! engine while a handle is checked out.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::types::{EngineLoader, SpeechModel, Transcript};
use crate::error::{Error, Result};

struct Slot {
    engine: Option<Box<dyn SpeechModel>>,
    last_used: Instant,
}

/// Owns the single engine slot.
pub struct EngineManager {
    loader: Box<dyn EngineLoader>,
    idle_timeout: Duration,
    slot: Mutex<Slot>,
    loaded: AtomicBool,
}

/// Exclusive access to a loaded engine.
///
/// Holds the engine lock until dropped and restamps last use on drop, so
/// time spent inside inference never counts as idle time.
pub struct EngineHandle<'a> {
    slot: MutexGuard<'a, Slot>,
    loaded: &'a AtomicBool,
}

impl EngineHandle<'_> {
    /// Run inference. An engine that died during the call is dropped so the
    /// next acquire loads a fresh one.
    pub fn transcribe(&mut self, audio_path: &Path) -> Result<Transcript> {
        let Some(engine) = self.slot.engine.as_mut() else {
            return Err(Error::Inference("engine is not loaded".to_string()));
        };

        let result = engine.transcribe(audio_path);
        if result.is_err() && !engine.is_alive() {
            warn!("Engine died during inference, dropping it");
            self.slot.engine = None;
            self.loaded.store(false, Ordering::SeqCst);
        }
        result
    }
}

impl Drop for EngineHandle<'_> {
    fn drop(&mut self) {
        self.slot.last_used = Instant::now();
    }
}

impl EngineManager {
    pub fn new(loader: Box<dyn EngineLoader>, idle_timeout: Duration) -> Self {
        info!(
            "EngineManager initialized: idle timeout {}s",
            idle_timeout.as_secs()
        );
        Self {
            loader,
            idle_timeout,
            slot: Mutex::new(Slot {
                engine: None,
                last_used: Instant::now(),
            }),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Return a live engine, loading it first if the slot is empty or the
    /// held engine has died.
    pub fn acquire(&self) -> Result<EngineHandle<'_>> {
        let mut slot = self.lock()?;
        if let Some(engine) = slot.engine.as_mut() {
            if !engine.is_alive() {
                warn!("Loaded engine is no longer alive, reloading");
                slot.engine = None;
                self.loaded.store(false, Ordering::SeqCst);
            }
        }
        if slot.engine.is_none() {
            slot.engine = Some(self.materialize()?);
            self.loaded.store(true, Ordering::SeqCst);
        }
        slot.last_used = Instant::now();
        Ok(EngineHandle {
            slot,
            loaded: &self.loaded,
        })
    }

    /// Monitor tick: release the engine if it has been idle for at least the
    /// timeout as of `now`. Returns whether an engine was released.
    pub fn release_if_idle(&self, now: Instant) -> Result<bool> {
        let mut slot = self.lock()?;
        if slot.engine.is_none() {
            return Ok(false);
        }

        let idle = now.saturating_duration_since(slot.last_used);
        if idle < self.idle_timeout {
            debug!("Engine idle for {:.1}s, keeping it loaded", idle.as_secs_f64());
            return Ok(false);
        }

        info!(
            "Engine idle for {:.1}s (timeout {}s), releasing",
            idle.as_secs_f64(),
            self.idle_timeout.as_secs()
        );
        slot.engine = None;
        self.loaded.store(false, Ordering::SeqCst);
        Ok(true)
    }

    /// Unload the engine now. Returns whether one was loaded.
    pub fn release(&self) -> Result<bool> {
        let mut slot = self.lock()?;
        let released = slot.engine.take().is_some();
        self.loaded.store(false, Ordering::SeqCst);
        if released {
            info!("Engine released");
        }
        Ok(released)
    }

    /// Drop the current engine and load a fresh one under the same lock.
    pub fn force_reload(&self) -> Result<()> {
        let mut slot = self.lock()?;
        if slot.engine.take().is_some() {
            info!("Engine released for reload");
        }
        self.loaded.store(false, Ordering::SeqCst);
        slot.engine = Some(self.materialize()?);
        self.loaded.store(true, Ordering::SeqCst);
        slot.last_used = Instant::now();
        Ok(())
    }

    /// Never blocks. Reflects the slot as of its last change, so a load in
    /// progress reads as not loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn materialize(&self) -> Result<Box<dyn SpeechModel>> {
        let label = self.loader.describe();
        info!("Loading {}", label);
        let started = Instant::now();

        let engine = self.loader.load().map_err(|err| match err {
            Error::EngineLoad(_) => err,
            other => Error::EngineLoad(other.to_string()),
        })?;

        info!(
            "{} loaded in {:.2}s",
            label,
            started.elapsed().as_secs_f64()
        );
        Ok(engine)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|_| Error::EngineLoad("engine lock poisoned".to_string()))
    }
}
