//! Inference engine capability, lifecycle and idle release.

pub(crate) mod lifecycle;
mod monitor;
mod types;
mod worker;

pub use lifecycle::{EngineHandle, EngineManager};
pub use monitor::IdleMonitor;
pub use types::{EngineLoader, SpeechModel, Transcript};
pub use worker::{WorkerEngine, WorkerLoader};
