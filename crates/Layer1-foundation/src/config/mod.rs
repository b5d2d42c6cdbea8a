//! Config - relay settings
//!
//! - `relay.rs` - RelayConfig (server, publisher, retention)

mod relay;

pub use relay::{RelayConfig, RELAY_CONFIG_FILE};
