//! RustPac - A proxy auto-config (PAC) server
//!
//! Provides:
//! - SQLite storage for proxy hosts and domain rules
//! - First-match rule resolution to ordered proxy directives
//! - PAC generation in embedded-logic and pre-expanded formats
//! - HTTP endpoints for PAC download and host/rule management

pub mod database;
pub mod error;
pub mod matcher;
pub mod model;
pub mod pac;
pub mod resolver;
pub mod server;

pub use database::{DatabaseManager, RuleRecord};
pub use error::{PacError, Result};
pub use model::{Host, HostConfig, HostInput, ProxyType, Rule, RuleInput};
pub use pac::PacFormat;
pub use server::{PacServer, ServerConfig};
