//! dmp delivery worker library.
//!
//! This crate primarily ships a `delivery-worker` binary, but we expose a
//! small library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod db;
pub mod evaluator;
pub mod handler;
pub mod heartbeat;
pub mod longpoll;
pub mod model;
pub mod queue;
pub mod state;
