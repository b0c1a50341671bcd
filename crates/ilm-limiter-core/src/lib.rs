//! Core domain types for the ILM limiter: phase order, size units, limiter
//! metadata extraction and the shared error type.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod limiter;
pub mod phase;
pub mod size;

pub use config::{RunConfig, CLUSTER_PRIVILEGES, INDEX_PRIVILEGES};
pub use error::{CoreError, CoreResult};
pub use lifecycle::{
    IndexLifecycleState, IndexPosition, IndexSnapshot, LifecyclePolicy, LifecycleStep,
    PhaseConfig, PhaseGroup, PhaseLimit, RawPolicy,
};
pub use limiter::{LimiterConfig, LimiterConfigError, LIMITER_KEY};
pub use phase::Phase;
pub use size::SizeFormatError;
