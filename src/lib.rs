//! Live bus tracking service
//!
//! Drivers push GPS positions over HTTP; viewers watch them live over a
//! WebSocket channel; a periodic sweep demotes silent vehicles to offline.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod models;
pub mod monitor;
pub mod realtime;
pub mod registry;
pub mod store;
