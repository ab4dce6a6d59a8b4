use std::fs;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use dex_catalog::error::{DexError, FailureReason};
use dex_catalog::pokeapi::{extract_record, parse_listing, species_locator};

fn fixture(name: &str) -> Value {
    let raw = fs::read_to_string(format!("tests/fixtures/{name}")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn extract_full_record() {
    let detail = fixture("detail_bulbasaur.json");
    let species = fixture("species_bulbasaur.json");

    let record = extract_record(&detail, &species).unwrap();

    assert_eq!(record.id, 1);
    assert_eq!(record.name, "bulbasaur");
    assert_eq!(record.display_name(), "Bulbasaur");
    assert_eq!(record.types, vec!["grass", "poison"]);
    assert_eq!(record.abilities, vec!["overgrow", "chlorophyll"]);
    assert_eq!(record.height, 7);
    assert_eq!(record.weight, 69);
    assert_eq!(record.stats.len(), 6);
    assert_eq!(record.stats["special-attack"], 65);
    assert_eq!(
        record.flavor_text,
        "A strange seed was planted on its back at birth. The plant sprouts and grows with this POKéMON."
    );
}

#[test]
fn missing_english_entry_is_empty_flavor_text() {
    let detail = fixture("detail_bulbasaur.json");
    let species = fixture("species_no_english.json");

    let record = extract_record(&detail, &species).unwrap();
    assert_eq!(record.flavor_text, "");
}

#[test]
fn missing_required_field_is_malformed() {
    let mut detail = fixture("detail_bulbasaur.json");
    detail.as_object_mut().unwrap().remove("weight");
    let species = fixture("species_bulbasaur.json");

    assert_matches!(
        extract_record(&detail, &species),
        Err(FailureReason::MalformedData(_))
    );
}

#[test]
fn mistyped_field_is_malformed() {
    let mut detail = fixture("detail_bulbasaur.json");
    detail["height"] = json!(-3);
    let species = fixture("species_bulbasaur.json");

    assert_matches!(
        extract_record(&detail, &species),
        Err(FailureReason::MalformedData(_))
    );
}

#[test]
fn stat_without_name_is_malformed() {
    let mut detail = fixture("detail_bulbasaur.json");
    detail["stats"][2] = json!({ "base_stat": 49 });
    let species = fixture("species_bulbasaur.json");

    assert_matches!(
        extract_record(&detail, &species),
        Err(FailureReason::MalformedData(_))
    );
}

#[test]
fn species_without_entries_is_malformed() {
    let detail = fixture("detail_bulbasaur.json");
    let species = json!({ "id": 1, "name": "bulbasaur" });

    assert_matches!(
        extract_record(&detail, &species),
        Err(FailureReason::MalformedData(_))
    );
}

#[test]
fn species_url_comes_from_detail() {
    let detail = fixture("detail_bulbasaur.json");
    assert_eq!(
        species_locator(&detail).unwrap(),
        "https://pokeapi.co/api/v2/pokemon-species/1/"
    );
    assert_matches!(
        species_locator(&json!({ "id": 1 })),
        Err(FailureReason::MalformedData(_))
    );
}

#[test]
fn listing_results_keep_remote_order() {
    let listing = parse_listing(&fixture("listing.json")).unwrap();
    let names: Vec<_> = listing.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["bulbasaur", "ivysaur", "venusaur"]);
    assert_eq!(listing[2].url, "https://pokeapi.co/api/v2/pokemon/3/");

    assert_matches!(
        parse_listing(&json!({ "count": 0 })),
        Err(DexError::ListingMalformed(_))
    );
}

#[test]
fn partial_stat_list_is_malformed() {
    let mut detail = fixture("detail_bulbasaur.json");
    detail["stats"].as_array_mut().unwrap().truncate(2);
    let species = fixture("species_bulbasaur.json");

    let err = extract_record(&detail, &species).unwrap_err();
    assert_matches!(
        &err,
        FailureReason::MalformedData(message) if message.contains("special-attack")
    );
}

#[test]
fn unknown_stat_is_malformed() {
    let mut detail = fixture("detail_bulbasaur.json");
    detail["stats"][5]["stat"]["name"] = json!("luck");
    let species = fixture("species_bulbasaur.json");

    assert_matches!(
        extract_record(&detail, &species),
        Err(FailureReason::MalformedData(_))
    );
}
