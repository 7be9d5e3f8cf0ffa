//! Campaign synchronization engine
//!
//! # Components
//!
//! - [`transport`]: Resilient HTTP execution with timeouts, retry, 429 handling, and re-auth
//! - [`retry`]: Exponential backoff policy for transient failures
//! - [`api`]: Campaign API endpoints behind the [`CampaignSource`] trait
//! - [`pagination`]: Sequential walk over the listing endpoint
//! - [`dispatcher`]: Bounded-concurrency per-record operations
//! - [`orchestrator`]: The run state machine tying everything together
//!
//! # Example
//!
//! ```ignore
//! use campaign_sync::sync::SyncOrchestrator;
//!
//! let orchestrator = SyncOrchestrator::new(tokens, source, repository, &config);
//! let summary = orchestrator.run().await?;
//! println!("{}", summary);
//! ```

pub mod api;
pub mod dispatcher;
pub mod orchestrator;
pub mod pagination;
pub mod retry;
pub mod transport;

// Re-export main types for convenience
pub use api::{CampaignApiClient, CampaignSource};
pub use dispatcher::ConcurrencyDispatcher;
pub use orchestrator::{SyncOrchestrator, SyncPhase};
pub use pagination::PaginationDriver;
pub use retry::RetryPolicy;
pub use transport::{
    build_http_client, parse_retry_after, RequestSpec, ResilientTransport, TransportResponse,
};
