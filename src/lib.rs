//! Tenant-wide SharePoint permission discovery and removal for Microsoft 365.

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod sweep;

pub use error::{Result, SweepError};
