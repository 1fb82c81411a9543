// src/lib.rs

pub mod analysis;
pub mod config;
pub mod github;
pub mod llm;
pub mod notify;
pub mod remediation;
pub mod server;
pub mod state;
pub mod store;
pub mod testgen;
