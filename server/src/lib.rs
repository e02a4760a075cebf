//! OTA Fleet Orchestrator Library
//!
//! Core modules for the otafleet rollout service.

pub mod aggregate;
pub mod app;
pub mod config;
pub mod errors;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod store;
pub mod tracker;
pub mod transport;
pub mod utils;
pub mod workers;
pub mod workflow;
