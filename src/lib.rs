pub mod archive;
pub mod cli;
pub mod config;
pub mod export;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod report;
pub mod store;
