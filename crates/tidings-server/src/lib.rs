pub mod app;
pub mod config;
pub mod scheduler;
pub mod seed;
