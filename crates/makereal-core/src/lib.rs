//! Core types, config and errors for makereal.

pub mod config;
pub mod error;
pub mod types;
