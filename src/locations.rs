//! Location table construction
//!
//! Parses the GeoLite2-City locations CSV into an ordered table of
//! location records plus a geoname-id -> table-index map. The table index
//! is the stable reference the range lists carry; the id map only lives
//! long enough for the range builder to consume it.
//!
//! Validation is strict: a bad field fails the whole build, naming the
//! field and value. A refresh must never publish a half-trusted table.

use std::io::Read;

use rustc_hash::FxHashMap;

use crate::error::{GeoError, Result};

/// Column count of the GeoLite2-City locations export.
pub const LOCATIONS_COLUMNS: usize = 13;

// Field positions within a locations record.
const COL_GEONAME_ID: usize = 0;
const COL_CONTINENT_CODE: usize = 2;
const COL_COUNTRY_CODE: usize = 4;
const COL_COUNTRY_NAME: usize = 5;
const COL_CITY_NAME: usize = 10;
const COL_METRO_CODE: usize = 11;

/// One row of the locations table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationRecord {
    /// External geoname identifier (0 when the feed left it unset)
    pub geoname_id: u32,
    /// Two-letter continent code, upper case
    pub continent_code: String,
    /// ISO 3166-1 alpha-2 country code, upper case
    pub country_code: String,
    /// Country name, free text without digits
    pub country_name: String,
    /// US metro code (0 when unset)
    pub metro_code: u32,
    /// City name, verbatim
    pub city_name: String,
}

/// Build the location table and geoname index from a locations CSV.
///
/// The first record is the header and is discarded. Later records that
/// repeat a geoname id overwrite its index mapping (last write wins); the
/// table itself keeps every row.
pub fn parse_locations<R: Read>(
    reader: R,
) -> Result<(Vec<LocationRecord>, FxHashMap<u32, usize>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut table = Vec::new();
    let mut id_map = FxHashMap::default();

    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        if index == 0 {
            // Header row
            continue;
        }
        if record.len() != LOCATIONS_COLUMNS {
            return Err(GeoError::SchemaError {
                got: record.len(),
                want: LOCATIONS_COLUMNS,
            });
        }

        let node = LocationRecord {
            geoname_id: parse_numeric(&record[COL_GEONAME_ID], "geoname id")?,
            continent_code: check_caps(&record[COL_CONTINENT_CODE], "continent code")?,
            country_code: check_caps(&record[COL_COUNTRY_CODE], "country code")?,
            country_name: check_name(&record[COL_COUNTRY_NAME], "country name")?,
            metro_code: parse_numeric(&record[COL_METRO_CODE], "metro code")?,
            city_name: record[COL_CITY_NAME].to_string(),
        };

        id_map.insert(node.geoname_id, table.len());
        table.push(node);
    }

    if table.is_empty() {
        return Err(GeoError::EmptyInput);
    }

    Ok((table, id_map))
}

/// Integer field; the feed leaves these empty to mean "unset".
fn parse_numeric(value: &str, field: &str) -> Result<u32> {
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| {
        GeoError::Corrupt(format!("{} should be a number, got {:?}", field, value))
    })
}

/// Code field: upper-case ASCII letters only, empty allowed.
fn check_caps(value: &str, field: &str) -> Result<String> {
    if value.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(value.to_string())
    } else {
        Err(GeoError::Corrupt(format!(
            "{} should be upper-case letters, got {:?}",
            field, value
        )))
    }
}

/// Name field: any text as long as it carries no digits.
fn check_name(value: &str, field: &str) -> Result<String> {
    if value.chars().any(|c| c.is_ascii_digit()) {
        Err(GeoError::Corrupt(format!(
            "{} should not contain digits, got {:?}",
            field, value
        )))
    } else {
        Ok(value.to_string())
    }
}
