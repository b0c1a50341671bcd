//! Phase-limit decision engine.
//!
//! ## Flow
//!
//! ```text
//! run_limits
//!   ├─ cluster privileges          (fatal when missing)
//!   ├─ list policies → limiter::filter_policies
//!   └─ per policy: check_lifecycle (isolated)
//!        ├─ index privileges
//!        ├─ explain every governed index → PhaseGroup
//!        └─ per limited phase, latest first: check_phase
//!             ├─ sizes, newest first, running total
//!             └─ over budget + steady step → move to next configured phase
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ilm_limiter_cluster::mock::MockClusterGateway;
//! use ilm_limiter_core::RunConfig;
//! use ilm_limiter_engine::{PhaseLimitEngine, ShutdownFlag, TracingSink};
//! use std::sync::Arc;
//!
//! # async fn example() -> ilm_limiter_core::CoreResult<()> {
//! let engine = PhaseLimitEngine::new(
//!     Arc::new(MockClusterGateway::new()),
//!     Arc::new(TracingSink),
//!     ShutdownFlag::new(),
//! );
//! let report = engine.run_limits(&RunConfig::new(true)).await?;
//! println!("{} indices would move", report.dry_run());
//! # Ok(())
//! # }
//! ```

mod engine;
mod outcome;
mod planner;
mod report;
mod shutdown;

pub use engine::PhaseLimitEngine;
pub use outcome::{
    IndexAction, IndexDecision, PhaseOutcome, PhaseReport, PolicyOutcome, PolicyReport, RunReport,
};
pub use planner::{plan_phase, PlannedIndex};
pub use report::{ReportingSink, TracingSink};
pub use shutdown::ShutdownFlag;
