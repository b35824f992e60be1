//! Translyzer combines bank statement CSV files into one table of transactions and summarizes
//! the expenses in it.
//!
//! Edits, category consolidation and statistics are not computed here. They are delegated to
//! worker processes through mailbox files, see [`protocol`] and [`dispatch`].

pub mod args;
pub mod commands;
mod config;
pub mod dispatch;
mod error;
pub mod import;
pub mod model;
pub mod protocol;
pub mod uploads;
mod utils;


pub use config::{ChannelsConfig, Config};
pub use dispatch::Dispatcher;
pub use error::{Error, ProtocolError, Result};
