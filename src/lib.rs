pub mod auth;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;

pub use engine::{Engine, EngineError};
