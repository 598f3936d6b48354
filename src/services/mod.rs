//! Service layer
//!
//! Read models composed from the cache, the guide and the proxy resolver for
//! whatever serving layer sits in front of this crate.

pub mod catalog;

pub use catalog::{CatalogPage, CatalogQuery, CatalogService, ChannelMeta, StreamEntry};
