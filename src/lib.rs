pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod global;
pub mod notifier;
pub mod provider;
pub mod services;
pub mod session;
pub mod speakers;
