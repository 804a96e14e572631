//! Club subscription lifecycle and treasury ledger engine for a
//! youth-program platform: approval, billing sweeps, dues settlement,
//! and member point grants.

pub mod config;
pub mod domain;
pub mod error;
pub mod integrations;
pub mod repository;
pub mod service;
