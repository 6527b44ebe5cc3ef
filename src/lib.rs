pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod loader;
pub mod logging;
pub mod runs;
pub mod store;
pub mod summarizer;
pub mod table;
