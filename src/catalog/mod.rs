// Catalog module
// Store and product data from the marketplace API, served through the cache.
// Author: kelexine (https://github.com/kelexine)

pub mod client;
pub mod service;

pub use client::MarketplaceClient;
pub use service::{products_key, store_key, CatalogService};
