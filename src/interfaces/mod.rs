//! Edges of the crate: CSV import/export and the webhook HTTP server.

pub mod csv;
pub mod http;
