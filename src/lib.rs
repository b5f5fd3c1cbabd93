//! idle-shutdownd - shut the workstation down after a period of user inactivity.
//!
//! Polls an idle-duration source, and once the configured threshold is
//! reached issues a delayed OS shutdown that the user can cancel.

pub mod app;
pub mod config;
pub mod console;
pub mod control;
pub mod domain;
pub mod event_log;
pub mod idle;
pub mod mock;
pub mod monitor;
pub mod shutdown;
pub mod state;
pub mod warning;
