//! # Probe Ingest Library
//!
//! Core functionality for the tank-probe telemetry service: XML batch
//! ingestion, the customer/site/probe hierarchy, measurement history and
//! the HTTP API.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod repositories;
pub mod server;
pub mod status;
pub mod telemetry;
pub use migration;
