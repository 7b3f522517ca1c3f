//! FirmScout - M&A lead generation for accounting firms
//!
//! Builds and maintains a prospect base of French accounting firms
//! (NAF 6920Z): ingestion from the Pappers API, from Société.com pages
//! and from bulk CSV files, deduplicated by SIREN into one SQLite store,
//! with status tracking and prospection scoring on top.

pub mod browser;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod model;
pub mod scoring;
pub mod services;
pub mod sources;
pub mod state;
pub mod status;
