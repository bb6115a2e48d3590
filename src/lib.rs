pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod regressor;
pub mod run_store;
pub mod sink;
pub mod trainer;
pub mod validation;
pub mod warehouse;
