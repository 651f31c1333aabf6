pub mod config;
pub mod embedding;
pub mod interaction_log;
