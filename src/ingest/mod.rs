//! Normalization, deduplication and bulk import

pub mod csv;
pub mod dedup;
pub mod normalize;
