//! Data models

pub mod execution;
pub mod firmware;
pub mod job;
