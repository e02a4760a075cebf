//! Background workers

pub mod status_listener;
