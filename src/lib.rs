// src/lib.rs

//! Earthquake bulletin crawler library
//!
//! Polls the Korea Meteorological Administration and the Japan
//! Meteorological Agency, publishes localized bulletin artifacts and sends
//! push notifications for relevant events.

pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
