//! MCP tool inputs for the Zendesk attachment tools.
//!
//! This module contains the input types and the limits applied to them
//! before they reach the attachment store.

mod inputs;

pub use inputs::*;
