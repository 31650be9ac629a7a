//! Geomark - IP-to-Geography Annotation Engine
//!
//! Geomark resolves IP addresses to geographic metadata (continent,
//! country, city, postal code, coordinates) against an in-memory index
//! built from the GeoLite2-City CSV exports. It is built for read-mostly
//! services: the index is constructed wholesale from the feed, served to
//! any number of concurrent lookups, and replaced atomically whenever the
//! feed refreshes.
//!
//! # Quick Start
//!
//! ```no_run
//! use geomark::{DatasetStore, GeoDataset};
//!
//! let dataset = GeoDataset::load_dir("/var/lib/geomark/geolite2")?;
//!
//! let store = DatasetStore::new();
//! store.publish(dataset);
//!
//! let metadata = store.annotate("8.8.8.8")?;
//! println!("{} / {}", metadata.country_code, metadata.city_name);
//! # Ok::<(), geomark::GeoError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! GeoLite2 CSVs ──> locations table + geoname index
//!                        │
//!                        v
//!        blocks feed ──> range builder (nesting resolver)
//!                        │
//!                        v
//!            immutable GeoDataset (v4 list, v6 list, locations)
//!                        │  publish (Arc swap)
//!                        v
//!                  DatasetStore ──> concurrent lookups
//! ```
//!
//! The range builder turns the feed's possibly-nested CIDR blocks into a
//! sorted, non-overlapping interval list; lookups are a binary search over
//! it. Dataset refreshes build entirely off to the side and swap a
//! pointer, so readers never see partial state.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CIDR range math and per-family address arithmetic
pub mod cidr;
/// Dataset assembly, directory loading, and metadata conversion
pub mod dataset;
/// Error types for dataset construction and lookups
pub mod error;
/// Location table construction from the locations CSV
pub mod locations;
/// Range index construction (the nesting resolver)
pub mod ranges;
/// Background dataset refresh loop
pub mod refresh;
/// Point-containment search strategies
pub mod search;
/// Concurrent dataset publication
pub mod store;

/// HTTP annotation service (enable the `server` feature)
#[cfg(feature = "server")]
pub mod server;

pub use crate::cidr::{cidr_range, RangeAddr};
pub use crate::dataset::{GeoDataset, GeoMetadata};
pub use crate::error::{GeoError, Result};
pub use crate::locations::LocationRecord;
pub use crate::ranges::RangeNode;
pub use crate::search::{BinarySearch, LinearScan, RangeSearch};
pub use crate::store::DatasetStore;
