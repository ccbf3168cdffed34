//! Garage Ledger Library
//!
//! This module exports the core components for testing and integration.

pub mod accounting;
pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod realtime;
pub mod types;
