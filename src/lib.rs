//! # Sentinel Jobs
//!
//! Scheduled maintenance and data retention for the sentinel chat bot:
//! user sync, media recommendation scans, history backfill, log retention
//! and cache eviction, plus a small operator API to inspect and trigger them.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod media_cache;
pub mod media_detector;
pub mod models;
pub mod platform;
pub mod repositories;
pub mod retention;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod trigger;
pub use migration;
