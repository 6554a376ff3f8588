//! Tenant-scoped property listing service.
//!
//! The core is [`properties::PropertyLister`]: given a tenant, a page window
//! and an optional name search it returns one page of property summaries
//! together with the total number of matching rows. Everything else in the
//! crate (HTTP surface, API-key authentication, the SQLite executor,
//! configuration, health and metrics) exists to host that operation.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod health;
pub mod metrics;
pub mod properties;
pub mod tenant;
