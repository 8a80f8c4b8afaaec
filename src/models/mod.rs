//! Data models for the Zendesk API.
//!
//! Only the attachment endpoints are modelled; the server never needs the
//! rest of the ticket surface.

mod attachment;

pub use attachment::*;
