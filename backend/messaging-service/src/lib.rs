pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod rpc;
pub mod services;
pub mod state;
