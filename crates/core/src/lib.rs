//! Action dispatch and sandbox-domain core.
//!
//! Everything in this crate is transport-agnostic: the HTTP surface lives in
//! `actionhost-api` and the Postgres store driver in `actionhost-db`. The
//! pieces here (registry, domain, persistence façade, dispatcher, script
//! loaders, in-memory store) are pure enough to be tested without a server.

pub mod action;
pub mod client;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod library;
pub mod persistence;
pub mod registry;
pub mod scripting;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
