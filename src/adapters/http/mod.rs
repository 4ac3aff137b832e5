//! Public HTTP adapter (axum 0.7).

pub mod server;

pub use server::{AppState, HttpServer, router};
