//! Monitoring emulator API server library.
//!
//! Exposes the core building blocks (config, service facade, error
//! handling, routes) so integration tests and the binary entrypoint can
//! both access them.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod persistence;
pub mod response;
pub mod router;
pub mod routes;
pub mod service;
pub mod state;
