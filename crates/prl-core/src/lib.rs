//! Core domain + application logic for the presence relay.
//!
//! This crate is intentionally framework-agnostic. The Telegram bot front end and
//! the user-account client live behind ports (traits) implemented in adapter crates.

pub mod auth;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod ports;
pub mod recorder;

pub use errors::{Error, Result};
