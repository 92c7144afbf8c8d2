// src/lib.rs
pub mod client;
pub mod config;
pub mod error;
pub mod poll;
pub mod sandbox;
pub mod scenario;
pub mod suite;

pub use client::{Actor, ApiResponse};
pub use config::RunConfig;
pub use error::{ClientError, ScenarioError};
pub use scenario::{Outcome, Report, Scenario, Step};
