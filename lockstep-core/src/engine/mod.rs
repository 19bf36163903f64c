//! The simulation loop and its strategy-facing surface.

pub mod algorithm;
pub mod context;
pub mod driver;
pub mod schedule;
pub mod status;

pub use algorithm::{Algorithm, AlgorithmConfig, AlgorithmError, CallbackSet};
pub use context::{AlgorithmContext, EngineMode};
pub use driver::{ControlHandle, Engine, EquitySample, FatalError, RunSummary};
pub use schedule::{Schedule, ScheduledEvent};
pub use status::{AlgorithmStatus, StatusUpdate, StopReason};
