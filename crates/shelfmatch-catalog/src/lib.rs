//! HTTP client for the catalog search service.
//!
//! The catalog is the pipeline's candidate source: a free-text brand/product
//! query returns an ordered list of reference products. The service is
//! treated as opaque, possibly slow, and possibly noisy; zero results is a
//! valid response, not an error.

mod client;
mod error;
mod retry;
mod types;

pub use client::CatalogClient;
pub use error::CatalogError;
pub use types::CatalogProduct;
