//! # gymgate-server
//!
//! Axum HTTP + `WebSocket` relay for gym door controllers.
//!
//! - `GET /ws`: devices open a persistent `WebSocket` and register under a gym ID
//! - `GET /unlock?gymID=..`: looks up the addressed device and sends it the
//!   fixed `UNLOCK` frame
//! - `GET /health`, `GET /metrics`: operational endpoints
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
