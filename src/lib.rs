pub mod archive;
pub mod browser;
pub mod config;
pub mod document;
pub mod dom;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod fill;
pub mod media;
pub mod orchestrator;
pub mod platforms;
pub mod service;
pub mod upload;

pub use config::Config;
pub use error::TransferError;
