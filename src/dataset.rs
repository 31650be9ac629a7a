//! Dataset assembly and annotation
//!
//! Bundles the location table and both per-family range lists into one
//! immutable value, built in a single pass from the GeoLite2-City CSV
//! exports. A dataset directory holds the three well-known files, each
//! either plain or gzip-compressed (detected by extension, the `.gz`
//! suffix appended to the canonical name).

use std::fs::File;
use std::io::{BufReader, Read};
use std::net::IpAddr;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GeoError, Result};
use crate::locations::{parse_locations, LocationRecord};
use crate::ranges::{parse_blocks, RangeNode};
use crate::search::{BinarySearch, RangeSearch};

/// Locations file inside a GeoLite2-City export.
pub const LOCATIONS_FILE: &str = "GeoLite2-City-Locations-en.csv";
/// IPv4 blocks file inside a GeoLite2-City export.
pub const BLOCKS_V4_FILE: &str = "GeoLite2-City-Blocks-IPv4.csv";
/// IPv6 blocks file inside a GeoLite2-City export.
pub const BLOCKS_V6_FILE: &str = "GeoLite2-City-Blocks-IPv6.csv";

/// Buffer size for CSV reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// The complete, immutable annotation dataset.
///
/// IPv4 and IPv6 ranges live in separate lists; address byte width is
/// uniform within each so the ordering the search relies on holds. Once
/// built, a dataset is never mutated; refreshes build a new one and swap
/// it in whole.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoDataset {
    /// IPv4 range list, ascending and disjoint
    pub ip4: Vec<RangeNode<std::net::Ipv4Addr>>,
    /// IPv6 range list, ascending and disjoint
    pub ip6: Vec<RangeNode<std::net::Ipv6Addr>>,
    /// Location table referenced by the range lists
    pub locations: Vec<LocationRecord>,
}

/// Geographic metadata for one annotated IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMetadata {
    /// Two-letter continent code
    pub continent_code: String,
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
    /// Country name
    pub country_name: String,
    /// Postal code of the matched block
    pub postal_code: String,
    /// US metro code (0 when unset)
    pub metro_code: u32,
    /// City name
    pub city_name: String,
    /// WGS84 latitude of the matched block
    pub latitude: f64,
    /// WGS84 longitude of the matched block
    pub longitude: f64,
}

impl GeoDataset {
    /// Build a dataset from already-opened CSV sources.
    ///
    /// The location table is parsed first; the two block lists then build
    /// in parallel against the shared geoname index. Any malformed record
    /// in any source fails the whole build.
    pub fn from_readers<L, B4, B6>(locations: L, blocks_v4: B4, blocks_v6: B6) -> Result<Self>
    where
        L: Read,
        B4: Read + Send,
        B6: Read + Send,
    {
        let (locations, id_map) = parse_locations(locations)?;

        let (ip4, ip6) = rayon::join(
            || parse_blocks(blocks_v4, &id_map),
            || parse_blocks(blocks_v6, &id_map),
        );
        // id_map dies here; only the table travels with the dataset.

        let dataset = Self {
            ip4: ip4?,
            ip6: ip6?,
            locations,
        };
        info!(
            ip4_ranges = dataset.ip4.len(),
            ip6_ranges = dataset.ip6.len(),
            locations = dataset.locations.len(),
            "dataset built"
        );
        Ok(dataset)
    }

    /// Build a dataset from a GeoLite2-City export directory.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        Self::from_readers(
            open_source(dir, LOCATIONS_FILE)?,
            open_source(dir, BLOCKS_V4_FILE)?,
            open_source(dir, BLOCKS_V6_FILE)?,
        )
    }

    /// Annotate one IP address with its geographic metadata.
    ///
    /// The query is parsed (`InvalidQueryIp` on failure), IPv4-mapped
    /// IPv6 addresses are canonicalized to IPv4, and the matching family
    /// list is searched. `NotFound` when no range contains the address.
    pub fn annotate(&self, ip: &str) -> Result<GeoMetadata> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| GeoError::InvalidQueryIp(ip.to_string()))?;

        match addr.to_canonical() {
            IpAddr::V4(v4) => BinarySearch
                .find(&self.ip4, v4)
                .map(|node| self.metadata_for(node))
                .ok_or(GeoError::NotFound),
            IpAddr::V6(v6) => BinarySearch
                .find(&self.ip6, v6)
                .map(|node| self.metadata_for(node))
                .ok_or(GeoError::NotFound),
        }
    }

    /// Join a matched range with the location table.
    ///
    /// A node without a location reference still yields its block-level
    /// fields (postal code, coordinates); the location fields stay empty.
    fn metadata_for<A>(&self, node: &RangeNode<A>) -> GeoMetadata {
        let unset = LocationRecord::default();
        let location = node
            .location
            .and_then(|index| self.locations.get(index))
            .unwrap_or(&unset);

        GeoMetadata {
            continent_code: location.continent_code.clone(),
            country_code: location.country_code.clone(),
            country_name: location.country_name.clone(),
            postal_code: node.postal_code.clone(),
            metro_code: location.metro_code,
            city_name: location.city_name.clone(),
            latitude: node.latitude,
            longitude: node.longitude,
        }
    }
}

/// Open a dataset file, preferring the plain name and falling back to the
/// gzip-compressed variant.
fn open_source(dir: &Path, name: &str) -> Result<Box<dyn Read + Send>> {
    let plain = dir.join(name);
    if plain.is_file() {
        let file = File::open(&plain)?;
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)));
    }

    let gzipped = dir.join(format!("{}.gz", name));
    if gzipped.is_file() {
        let file = File::open(&gzipped)?;
        return Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )));
    }

    Err(GeoError::Io(format!(
        "{} not found in {} (plain or .gz)",
        name,
        dir.display()
    )))
}
