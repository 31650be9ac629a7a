//! End-to-end tests for dataset construction and annotation
//!
//! These exercise the whole pipeline from CSV text to lookup answers,
//! including the documented nesting scenarios and the publication
//! lifecycle around the store.

use std::net::Ipv4Addr;
use std::sync::Arc;

use geomark::{DatasetStore, GeoDataset, GeoError, LinearScan, RangeSearch};

const LOCATIONS_HEADER: &str = "geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,subdivision_1_iso_code,subdivision_1_name,subdivision_2_iso_code,subdivision_2_name,city_name,metro_code,time_zone\n";
const BLOCKS_HEADER: &str = "network,geoname_id,registered_country_geoname_id,represented_country_geoname_id,is_anonymous_proxy,is_satellite_provider,postal_code,latitude,longitude,accuracy_radius\n";

fn locations_csv(rows: &[&str]) -> String {
    let mut out = String::from(LOCATIONS_HEADER);
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

fn blocks_csv(rows: &[&str]) -> String {
    let mut out = String::from(BLOCKS_HEADER);
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

/// A v6 blocks file with one location-less placeholder record, for tests
/// that only exercise the v4 side.
fn stub_blocks_v6() -> String {
    blocks_csv(&["2001:db8::/32,,,,0,0,,,,"])
}

fn build(locations: &str, blocks_v4: &str, blocks_v6: &str) -> Result<GeoDataset, GeoError> {
    GeoDataset::from_readers(
        locations.as_bytes(),
        blocks_v4.as_bytes(),
        blocks_v6.as_bytes(),
    )
}

#[test]
fn nested_blocks_resolve_to_three_ranges() {
    // Parent /8 with a nested /16: the parent's head, the child, and the
    // parent's open-ended continuation.
    let dataset = build(
        &locations_csv(&[
            "100,en,NA,\"North America\",US,\"United States\",,,,,Oakland,,America/Los_Angeles",
            "200,en,EU,Europe,DE,Germany,,,,,Berlin,,Europe/Berlin",
        ]),
        &blocks_csv(&["10.0.0.0/8,100,,,0,0,,,,", "10.1.0.0/16,200,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap();

    assert_eq!(dataset.ip4.len(), 3);
    assert_eq!(dataset.ip4[0].low, Ipv4Addr::new(10, 0, 0, 0));
    assert_eq!(dataset.ip4[0].high, Ipv4Addr::new(10, 0, 255, 255));
    assert_eq!(dataset.ip4[1].low, Ipv4Addr::new(10, 1, 0, 0));
    assert_eq!(dataset.ip4[1].high, Ipv4Addr::new(10, 1, 255, 255));
    assert_eq!(dataset.ip4[2].low, Ipv4Addr::new(10, 2, 0, 0));
    assert_eq!(dataset.ip4[2].high, Ipv4Addr::new(255, 255, 255, 255));

    assert_eq!(dataset.annotate("10.0.12.34").unwrap().city_name, "Oakland");
    assert_eq!(dataset.annotate("10.1.12.34").unwrap().city_name, "Berlin");
    assert_eq!(dataset.annotate("10.2.0.0").unwrap().city_name, "Oakland");
}

#[test]
fn boundary_addresses_resolve_to_their_range() {
    let dataset = build(
        &locations_csv(&["1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["20.0.0.0/12,1,,,0,0,,,,", "30.0.0.0/12,1,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap();

    // Every constructed bound must contain itself.
    for node in &dataset.ip4 {
        for probe in [node.low, node.high] {
            let found = LinearScan.find(&dataset.ip4, probe).unwrap();
            assert_eq!(found.low, node.low, "bound {} fell into the wrong range", probe);
        }
    }
}

#[test]
fn address_between_disjoint_ranges_is_not_found() {
    let dataset = build(
        &locations_csv(&["1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["20.0.0.0/12,1,,,0,0,,,,", "30.0.0.0/12,1,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap();

    // 20.0.0.0/12 closes at 20.15.255.255 when 30.0.0.0/12 arrives.
    assert_eq!(
        dataset.annotate("20.16.0.0").unwrap_err(),
        GeoError::NotFound
    );
    assert_eq!(
        dataset.annotate("29.255.255.255").unwrap_err(),
        GeoError::NotFound
    );
}

#[test]
fn every_address_in_a_range_resolves_to_its_location() {
    let dataset = build(
        &locations_csv(&[
            "100,en,NA,\"North America\",US,\"United States\",,,,,Oakland,,America/Los_Angeles",
            "200,en,EU,Europe,DE,Germany,,,,,Berlin,,Europe/Berlin",
        ]),
        &blocks_csv(&["10.0.0.0/8,100,,,0,0,,,,", "10.1.0.0/16,200,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap();

    for node in &dataset.ip4 {
        let low = u32::from(node.low);
        let high = u32::from(node.high);
        // Sample the interval rather than walking millions of addresses.
        let probes = [low, low + (high - low) / 2, high];
        for probe in probes {
            let found = LinearScan
                .find(&dataset.ip4, Ipv4Addr::from(probe))
                .unwrap();
            assert_eq!(found.location, node.location);
        }
    }
}

#[test]
fn location_without_block_is_fine_and_miss_degrades() {
    // Geoname 17 has no block; the block's ids are unknown in the table.
    let dataset = build(
        &locations_csv(&["17,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["10.0.0.0/8,999,888,,0,0,59000,50.63,3.06,"]),
        &stub_blocks_v6(),
    )
    .unwrap();

    assert_eq!(dataset.locations.len(), 1);
    let meta = dataset.annotate("10.1.2.3").unwrap();
    assert_eq!(meta.country_code, "", "unknown geoname leaves location fields empty");
    assert_eq!(meta.city_name, "");
    assert_eq!(meta.postal_code, "59000", "block-level fields still carried");
    assert_eq!(meta.latitude, 50.63);
}

#[test]
fn lower_case_continent_code_fails_the_build() {
    let err = build(
        &locations_csv(&["17,en,eu,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["10.0.0.0/8,17,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap_err();
    assert!(matches!(err, GeoError::Corrupt(msg) if msg.contains("continent code")));
}

#[test]
fn families_are_searched_independently() {
    let dataset = build(
        &locations_csv(&[
            "1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris",
            "2,en,EU,Europe,NL,Netherlands,,,,,Amsterdam,,Europe/Amsterdam",
        ]),
        &blocks_csv(&["10.0.0.0/8,1,,,0,0,,,,"]),
        &blocks_csv(&["2001:db8::/32,2,,,0,0,,,,"]),
    )
    .unwrap();

    assert_eq!(dataset.annotate("10.0.0.1").unwrap().city_name, "Paris");
    assert_eq!(
        dataset.annotate("2001:db8::1").unwrap().city_name,
        "Amsterdam"
    );
}

#[test]
fn store_not_ready_then_ready() {
    let store = Arc::new(DatasetStore::new());
    assert_eq!(
        store.annotate("10.1.2.3").unwrap_err(),
        GeoError::NotReady,
        "before any publish the store reports not-ready, not a miss"
    );

    let dataset = build(
        &locations_csv(&["1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["10.0.0.0/8,1,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap();
    store.publish(dataset);

    assert_eq!(store.annotate("10.1.2.3").unwrap().city_name, "Paris");
}

#[test]
fn failed_build_never_replaces_a_serving_dataset() {
    let store = DatasetStore::new();
    let good = build(
        &locations_csv(&["1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["10.0.0.0/8,1,,,0,0,,,,"]),
        &stub_blocks_v6(),
    )
    .unwrap();
    store.publish(good);

    // A corrupt feed fails the build before anything reaches the store.
    let bad = build(
        &locations_csv(&["1,en,eu,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["10.0.0.0/8,1,,,0,0,,,,"]),
        &stub_blocks_v6(),
    );
    assert!(bad.is_err());

    assert_eq!(store.annotate("10.1.2.3").unwrap().city_name, "Paris");
}

#[test]
fn schema_error_names_the_width() {
    let err = build(
        &locations_csv(&["1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&["10.0.0.0/8,1,0,0"]),
        &stub_blocks_v6(),
    )
    .unwrap_err();
    assert_eq!(err, GeoError::SchemaError { got: 4, want: 10 });
}

#[test]
fn range_list_invariants_hold_for_messy_nesting() {
    let dataset = build(
        &locations_csv(&["1,en,EU,Europe,FR,France,,,,,Paris,,Europe/Paris"]),
        &blocks_csv(&[
            "1.0.0.0/8,1,,,0,0,,,,",
            "1.0.0.0/16,1,,,0,0,,,,",
            "1.0.128.0/17,1,,,0,0,,,,",
            "1.64.0.0/10,1,,,0,0,,,,",
            "2.0.0.0/8,1,,,0,0,,,,",
        ]),
        &stub_blocks_v6(),
    )
    .unwrap();

    for node in &dataset.ip4 {
        assert!(node.low <= node.high);
    }
    for pair in dataset.ip4.windows(2) {
        assert!(pair[0].low < pair[1].low, "ascending, unique lows");
        assert!(pair[0].high < pair[1].low, "disjoint");
    }
}
