pub mod app;
pub mod config;
pub mod core;
pub mod engine;
pub mod provider;
pub mod scanner;
