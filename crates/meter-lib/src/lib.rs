//! Library for measuring container and deployment startup latency
//!
//! This crate provides the core functionality for:
//! - Aggregating per-container startup records into deployment metrics
//! - Cluster-state access for deployment/pod membership
//! - Scraping containerd's on-disk startup timings
//! - Pushing records to the central exporter
//! - Health checks and observability

pub mod cluster;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod push;
pub mod scheduler;
pub mod scrape;

pub use engine::{Engine, MetricSink};
pub use error::MeterError;
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::ExporterMetrics;
pub use scheduler::ScoringLoop;
