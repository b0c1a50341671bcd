//! Cluster access for the ILM limiter.
//!
//! [`ClusterGateway`] is the seam between the decision engine and the
//! cluster. [`ElasticsearchGateway`] talks to a real cluster over HTTP,
//! [`mock::MockClusterGateway`] simulates one in memory.

mod elasticsearch;
mod gateway;
pub mod mock;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchGateway};
pub use gateway::{ClusterGateway, TransitionOutcome};
