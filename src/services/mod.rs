//! Services layer
//!
//! Business logic above the store, called by the CLI and by background tasks.
//!
//! - `EnrichmentService` - score stored companies with the configured scorer

pub mod enrichment;

pub use enrichment::{EnrichmentParams, EnrichmentReport, EnrichmentService};
