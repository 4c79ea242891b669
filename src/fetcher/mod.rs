pub mod client;
pub mod errors;
pub mod pipeline;
pub mod types;

pub use client::{build_client, fetch, fetch_binary, fetch_json, get_client};
pub use errors::FetchError;
pub use types::{BinaryResponse, Charset, PageResponse};
