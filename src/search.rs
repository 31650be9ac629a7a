//! Point-containment search over a finished range list
//!
//! The search algorithm sits behind a small trait so the scan strategy can
//! change without touching callers: `LinearScan` is the reference
//! implementation, `BinarySearch` exploits the list invariants (ascending,
//! disjoint) for dataset-sized lists. Both answer the same contract: the
//! unique range containing the address, or nothing.
//!
//! Neither implementation re-validates the invariants; the builder owns
//! those.

use crate::cidr::RangeAddr;
use crate::ranges::RangeNode;

/// Strategy for finding the range containing an address.
pub trait RangeSearch {
    /// Find the range whose `[low, high]` contains `addr`.
    fn find<'a, A: RangeAddr>(
        &self,
        ranges: &'a [RangeNode<A>],
        addr: A,
    ) -> Option<&'a RangeNode<A>>;
}

/// Ordered scan tracking the most recent containing range.
///
/// Once a later range starts past the address while a containing range was
/// already seen, that range is the answer.
pub struct LinearScan;

impl RangeSearch for LinearScan {
    fn find<'a, A: RangeAddr>(
        &self,
        ranges: &'a [RangeNode<A>],
        addr: A,
    ) -> Option<&'a RangeNode<A>> {
        let mut in_range = None;
        for node in ranges {
            if addr >= node.low && addr <= node.high {
                in_range = Some(node);
            } else if in_range.is_some() && addr < node.low {
                return in_range;
            }
        }
        in_range
    }
}

/// Partition-point search over the ascending `low` bounds.
pub struct BinarySearch;

impl RangeSearch for BinarySearch {
    fn find<'a, A: RangeAddr>(
        &self,
        ranges: &'a [RangeNode<A>],
        addr: A,
    ) -> Option<&'a RangeNode<A>> {
        // First index whose range starts past the address; the only
        // possible container is the range just before it.
        let index = ranges.partition_point(|node| node.low <= addr);
        let candidate = ranges[..index].last()?;
        (addr <= candidate.high).then_some(candidate)
    }
}
