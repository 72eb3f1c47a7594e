//! Configuration types and loading.
//!
//! Holds the sections shared by every vless-rs binary (logging and TCP
//! socket options) and a format-detecting file loader. Outbound specific
//! sections live next to the code that consumes them.

mod defaults;
mod loader;
mod types;

pub use loader::{ConfigError, load_config, parse_config};
pub use types::{LogFormat, LogOutput, LoggingConfig, TcpConfig};
