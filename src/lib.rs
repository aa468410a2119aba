pub mod broadcast;
pub mod client;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod rng;
pub mod store;
pub mod territory;
pub mod types;
