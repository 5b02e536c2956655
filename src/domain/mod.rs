//! Domain model: transactions, projects, providers and the ports the
//! application layer depends on.

pub mod callback;
pub mod http;
pub mod money;
pub mod notification;
pub mod phone;
pub mod ports;
pub mod project;
pub mod provider;
pub mod transaction;
