//! campaign-sync - A resilient synchronization engine for a paginated campaign API
//!
//! This crate authenticates against the campaign service, pages through the
//! full campaign listing, pushes each record back through the per-campaign
//! sync endpoint with bounded concurrency, and mirrors the results into a
//! local SQLite database.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod otel;
pub mod sync;
