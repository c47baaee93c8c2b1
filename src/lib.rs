pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod exit;
pub mod fingerprint;
pub mod graph;
pub mod introspection;
pub mod logs;
pub mod probes;
pub mod schema;
pub mod transport;
pub mod ui;
