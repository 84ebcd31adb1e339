//! Local HTTP API for a playback client.
//!
//! Exposes the playlist proxy, the stream relay and the download scheduler of a
//! [`ferry_engine::MediaGateway`] under `/api`.

pub mod error;
pub mod routes;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use server::{ApiServer, AppState};
