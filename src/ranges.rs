//! Range index construction
//!
//! Turns the pre-sorted stream of GeoLite2 block records into a sorted,
//! gap-filled, non-overlapping list of inclusive address ranges, each
//! annotated with a location reference and coordinates.
//!
//! The feed lists a nested (more specific) block immediately after the
//! broader block that contains it. The builder keeps a stack of "open"
//! ranges whose upper bound is not yet settled: a new block either nests
//! inside the open top (the top's emitted slice is closed just before the
//! child starts) or lies past it (open ranges are popped closed, and the
//! enclosing range re-emerges as a continuation slice after the child it
//! absorbed). Every emitted entry carries the family maximum as a
//! provisional upper bound until one of those events settles it; the very
//! last entry of a list keeps that open-ended bound, faithfully mirroring
//! the feed's trailing asymmetry.

use std::io::Read;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::cidr::RangeAddr;
use crate::error::{GeoError, Result};

/// Column count of the GeoLite2-City blocks exports (IPv4 and IPv6 alike).
pub const BLOCKS_COLUMNS: usize = 10;

// Field positions within a blocks record.
const COL_NETWORK: usize = 0;
const COL_GEONAME_ID: usize = 1;
const COL_REGISTERED_GEONAME_ID: usize = 2;
const COL_POSTAL_CODE: usize = 6;
const COL_LATITUDE: usize = 7;
const COL_LONGITUDE: usize = 8;

/// One contiguous, inclusive address interval with its annotation.
///
/// `low <= high` always holds, and within a finished list the intervals
/// are disjoint and ascending by `low`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNode<A> {
    /// First address of the interval
    pub low: A,
    /// Last address of the interval (inclusive)
    pub high: A,
    /// Index into the location table, or `None` when neither geoname id
    /// of the record was known
    pub location: Option<usize>,
    /// Postal code, verbatim from the feed
    pub postal_code: String,
    /// WGS84 latitude (0.0 when the feed left it unset)
    pub latitude: f64,
    /// WGS84 longitude (0.0 when the feed left it unset)
    pub longitude: f64,
}

/// A range pushed but not yet closed by a later block.
struct OpenRange<A> {
    /// The range as the feed declared it; `node.high` is the block's own
    /// upper bound, used for nesting decisions and continuation slices.
    node: RangeNode<A>,
    /// Where the provisional entry for this range sits in the output,
    /// `None` once that entry was dropped as an empty leading slice.
    out: Option<usize>,
}

/// Streaming builder for one address family's range list.
pub struct RangeListBuilder<'m, A> {
    id_map: &'m FxHashMap<u32, usize>,
    list: Vec<RangeNode<A>>,
    stack: Vec<OpenRange<A>>,
    misses: u64,
}

impl<'m, A: RangeAddr> RangeListBuilder<'m, A> {
    /// Create a builder resolving location references through `id_map`.
    pub fn new(id_map: &'m FxHashMap<u32, usize>) -> Self {
        Self {
            id_map,
            list: Vec::new(),
            stack: Vec::new(),
            misses: 0,
        }
    }

    /// Feed the next block record, in feed order.
    pub fn push_record(&mut self, record: &csv::StringRecord) -> Result<()> {
        if record.len() != BLOCKS_COLUMNS {
            return Err(GeoError::SchemaError {
                got: record.len(),
                want: BLOCKS_COLUMNS,
            });
        }

        let (low, high) = A::parse_cidr(&record[COL_NETWORK])?;
        let location = self.resolve_location(record);
        let node = RangeNode {
            low,
            high,
            location,
            postal_code: record[COL_POSTAL_CODE].to_string(),
            latitude: parse_coordinate(&record[COL_LATITUDE], "latitude")?,
            longitude: parse_coordinate(&record[COL_LONGITUDE], "longitude")?,
        };

        self.resolve_nesting(&node);
        self.stack.push(OpenRange {
            out: Some(self.list.len()),
            node: node.clone(),
        });
        self.list.push(RangeNode {
            high: A::MAX,
            ..node
        });
        Ok(())
    }

    /// Close every range still open and hand back the finished list.
    pub fn finish(mut self) -> Vec<RangeNode<A>> {
        // End of feed: flush as if a block beyond every open range arrived.
        while let Some(popped) = self.stack.pop() {
            self.settle_entry(&popped);
            let Some(peek) = self.stack.last() else {
                break;
            };
            let slice_low = popped.node.high.plus_one();
            let slice_high = peek.node.high;
            let parent = peek.node.clone();
            self.emit_slice(&parent, slice_low, slice_high);
        }

        // The trailing range keeps the open-ended upper bound; the feed
        // construction never closes its final block.
        if let Some(last) = self.list.last_mut() {
            last.high = A::MAX;
        }

        if self.misses > 0 {
            debug!(misses = self.misses, "blocks without a known geoname id");
        }
        debug_assert!(self
            .list
            .windows(2)
            .all(|w| w[0].high < w[1].low && w[0].low <= w[0].high));
        self.list
    }

    /// Geoname lookup: primary id, then the registered-country backup.
    /// Misses degrade to "no location" rather than failing the build.
    fn resolve_location(&mut self, record: &csv::StringRecord) -> Option<usize> {
        let id_map = self.id_map;
        let lookup = |field: &str| {
            let id: u32 = field.parse().ok()?;
            id_map.get(&id).copied()
        };
        let location = lookup(&record[COL_GEONAME_ID])
            .or_else(|| lookup(&record[COL_REGISTERED_GEONAME_ID]));
        if location.is_none() {
            self.misses += 1;
            warn!(
                network = &record[COL_NETWORK],
                geoname_id = &record[COL_GEONAME_ID],
                "no known geoname id for block"
            );
        }
        location
    }

    /// Reconcile the open stack against the next block's position.
    fn resolve_nesting(&mut self, new: &RangeNode<A>) {
        let Some(top) = self.stack.last() else {
            return;
        };

        if new.low > top.node.high {
            // The new block lies past every address the top still covers.
            self.close_open_ranges(new.low);
        } else {
            // The new block nests inside the open top: the top's emitted
            // slice ends where the child begins.
            let out = self.stack.last().unwrap().out;
            if let Some(index) = out {
                if new.low > self.list[index].low {
                    self.list[index].high = new.low.minus_one();
                } else {
                    // Child starts at the parent's first address; the
                    // parent's leading slice is empty. Drop it, the parent
                    // stays open for the slice after the child.
                    debug_assert_eq!(index + 1, self.list.len());
                    self.list.pop();
                    self.stack.last_mut().unwrap().out = None;
                }
            }
        }
    }

    /// Pop and close open ranges that end before `new_low`, re-emitting
    /// enclosing ranges as continuation slices where gaps remain.
    fn close_open_ranges(&mut self, new_low: A) {
        while let Some(popped) = self.stack.pop() {
            self.settle_entry(&popped);
            let Some(peek) = self.stack.last() else {
                // Nothing left to reconcile.
                break;
            };
            let parent = peek.node.clone();
            let slice_low = popped.node.high.plus_one();
            if new_low < parent.high {
                // The next block still falls inside this enclosing range:
                // fill the gap between the closed child and the new block,
                // and leave the parent open.
                self.emit_slice(&parent, slice_low, new_low.minus_one());
                break;
            }
            // The enclosing range ends before the new block too: emit its
            // tail after the closed child and keep popping.
            let slice_high = parent.high.min(new_low.minus_one());
            self.emit_slice(&parent, slice_low, slice_high);
        }
    }

    /// A popped range is closed for good: if its provisional entry was
    /// never narrowed by a nested child, it ends at its own upper bound.
    fn settle_entry(&mut self, popped: &OpenRange<A>) {
        if let Some(index) = popped.out {
            if self.list[index].high == A::MAX {
                self.list[index].high = popped.node.high;
            }
        }
    }

    /// Append a continuation slice of `parent` covering `[low, high]`.
    fn emit_slice(&mut self, parent: &RangeNode<A>, low: A, high: A) {
        if low > high {
            // Zero-width slice (the child ended flush against the next
            // block or the parent's own bound); nothing to cover.
            warn!(parent_low = %parent.low, "skipping empty continuation slice");
            return;
        }
        let mut slice = parent.clone();
        slice.low = low;
        slice.high = high;
        self.list.push(slice);
    }
}

/// Parse a whole blocks CSV into a finished range list.
///
/// The first record is the header. A source without data records is
/// `EmptyInput`; any malformed record aborts the build.
pub fn parse_blocks<R: Read, A: RangeAddr>(
    reader: R,
    id_map: &FxHashMap<u32, usize>,
) -> Result<Vec<RangeNode<A>>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut builder = RangeListBuilder::new(id_map);
    let mut records = 0u64;
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        if index == 0 {
            // Header row
            continue;
        }
        builder.push_record(&record)?;
        records += 1;
    }
    if records == 0 {
        return Err(GeoError::EmptyInput);
    }

    let list = builder.finish();
    debug!(records, ranges = list.len(), "range list built");
    Ok(list)
}

/// Coordinate field; the feed leaves these empty to mean "unset".
fn parse_coordinate(value: &str, field: &str) -> Result<f64> {
    if value.is_empty() {
        return Ok(0.0);
    }
    value.parse().map_err(|_| {
        GeoError::Corrupt(format!("{} should be a number, got {:?}", field, value))
    })
}
