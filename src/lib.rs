pub mod config;
pub mod errors;
pub mod graph;
pub mod logger;
pub mod project;
pub mod resolution;
pub mod stylesheet;
pub mod sync;
pub mod types;
