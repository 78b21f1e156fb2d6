pub mod config;
pub mod errors;
pub mod llm;
pub mod models;
pub mod parsers;
pub mod repo;
pub mod services;
pub mod store;
