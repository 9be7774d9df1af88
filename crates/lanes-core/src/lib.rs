//! lanes-core library.
//!
//! The engine behind a grouped issue board: partition issues into buckets,
//! allocate fractional sort keys when an issue is dropped between two
//! others, and reconcile optimistic local edits with the system of record.
//!
//! # Conventions
//!
//! - **Errors**: library errors are `thiserror` enums carrying an [`error::ErrorCode`];
//!   `anyhow::Result` is used for configuration loading.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod board;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod lock;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod service;
pub mod sort_key;
pub mod timing;
pub mod view;
