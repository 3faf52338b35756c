//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (validated, immutable)
//!     → decode section turned into DecodeSettings per handler group
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; the route table is built from it and
//!   never rebuilt while serving
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::DecodeConfig;
pub use schema::DispatchConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
