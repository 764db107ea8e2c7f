//! HTTP client for the external product metadata API.

pub mod metadata_api;

pub use metadata_api::{MetaFetchError, MetadataClient, MetadataClientConfig};
