pub mod config;
pub mod contract;
pub mod devqa;
pub mod error;
pub mod executor;
pub mod gate;
pub mod io;
pub mod logger;
pub mod orchestrator;
pub mod paths;
pub mod step;
pub mod story;
pub mod types;
pub mod workflow;

pub use error::{Result, SemadError};
