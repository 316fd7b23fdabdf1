//! Dragnet Config - Declarative tool definitions and environment settings.
//!
//! This crate provides:
//! - The tool-definition file format (embedded defaults, optional override)
//! - The closed declarative parameter-schema set and its validator
//! - Environment-derived settings and the capability map
//!
//! Parsing an unknown parameter type is a startup-time fatal error; unknown
//! keys in the tool file are ignored.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod schema;
pub mod settings;
pub mod tools_file;

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    ParamSchema, PropertySchema, SchemaIssue, StringFormat, properties_to_json_schema,
    validate_object,
};
pub use settings::{CapabilityMap, Settings};
pub use tools_file::{ToolEntry, ToolsFile};
