//! SectorFlux server library - the HTTP/WebSocket surface around the proxy
//! engine.
//!
//! This library provides the route table, proxy engine, chat sessions, and
//! dashboard broadcaster. It's separated from main.rs to enable integration
//! testing.

pub mod broadcaster;
pub mod chat;
pub mod config;
pub mod logging;
pub mod proxy;
pub mod routes;
pub mod state;
