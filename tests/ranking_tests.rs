//! Integration tests for the ranked supplement listing.

use std::collections::HashMap;

use stackrate::ranking::{rank, RankQuery, SortKey};
use stackrate::storage::{NewRating, Storage};

fn test_storage() -> Storage {
    Storage::open_in_memory().unwrap()
}

fn user(storage: &Storage, name: &str) -> i64 {
    storage.create_user(name, false).unwrap()
}

fn supplement(storage: &Storage, name: &str) -> i64 {
    storage.create_supplement(name, "General", None).unwrap()
}

fn filters(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn query(pairs: &[(&str, &str)]) -> RankQuery {
    RankQuery {
        filters: filters(pairs),
        ..Default::default()
    }
}

#[test]
fn test_condition_filter_example_scenario() {
    // Supplement A has no ratings; B has 3 ratings (4, 5, 3) tagged with the
    // condition "Sleep". Filtering on Sleep must rank B first with avg 4.00
    // and leave A visible with a null average.
    let storage = test_storage();
    let a = supplement(&storage, "Ashwagandha");
    let b = supplement(&storage, "Magnesium");
    let sleep = storage.create_condition("Sleep").unwrap();

    for (name, score) in [("u1", 4), ("u2", 5), ("u3", 3)] {
        storage
            .create_rating(&NewRating {
                user_id: user(&storage, name),
                supplement_id: b,
                score,
                purposes: vec![sleep],
                ..Default::default()
            })
            .unwrap();
    }

    let page = rank(&storage, &query(&[("conditions", "Sleep")])).unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, b);
    assert_eq!(page.items[0].avg_rating, Some(4.0));
    assert_eq!(page.items[0].rating_count, 3);
    assert_eq!(page.items[1].id, a);
    assert_eq!(page.items[1].avg_rating, None);
    assert_eq!(page.items[1].rating_count, 0);
}

#[test]
fn test_filter_restricts_aggregation_not_membership() {
    // One supplement with a matching and a non-matching rating: the average
    // must come from the matching subset only, and a supplement with zero
    // matching ratings must still appear rather than being filtered out.
    let storage = test_storage();
    let mixed = supplement(&storage, "Zinc");
    let unmatched = supplement(&storage, "Iron");
    let sleep = storage.create_condition("Sleep").unwrap();
    let focus = storage.create_condition("Focus").unwrap();

    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u1"),
            supplement_id: mixed,
            score: 5,
            purposes: vec![sleep],
            ..Default::default()
        })
        .unwrap();
    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u2"),
            supplement_id: mixed,
            score: 1,
            purposes: vec![focus],
            ..Default::default()
        })
        .unwrap();
    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u3"),
            supplement_id: unmatched,
            score: 2,
            purposes: vec![focus],
            ..Default::default()
        })
        .unwrap();

    let page = rank(&storage, &query(&[("conditions", "Sleep")])).unwrap();
    assert_eq!(page.items.len(), 2, "no supplement may be filtered away");

    let mixed_row = page.items.iter().find(|s| s.id == mixed).unwrap();
    assert_eq!(mixed_row.avg_rating, Some(5.0), "only the Sleep rating averages");
    assert_eq!(mixed_row.rating_count, 1);

    let unmatched_row = page.items.iter().find(|s| s.id == unmatched).unwrap();
    assert_eq!(unmatched_row.avg_rating, None);
    assert_eq!(unmatched_row.rating_count, 0);

    // And the null average sorts last
    assert_eq!(page.items[0].id, mixed);
}

#[test]
fn test_null_averages_sort_last_for_both_sort_keys() {
    let storage = test_storage();
    let low = supplement(&storage, "Boron");
    let empty = supplement(&storage, "Aardvark Extract");

    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u1"),
            supplement_id: low,
            score: 1,
            ..Default::default()
        })
        .unwrap();

    for sort in [SortKey::HighestRating, SortKey::MostRatings] {
        let page = rank(
            &storage,
            &RankQuery {
                sort,
                ..Default::default()
            },
        )
        .unwrap();
        // "Aardvark Extract" would win an alphabetical tie-break; a low but
        // present average must still outrank a missing one.
        assert_eq!(page.items[0].id, low);
        assert_eq!(page.items[1].id, empty);
    }
}

#[test]
fn test_count_consistency_across_composed_filters() {
    let storage = test_storage();
    let supp = supplement(&storage, "Magnesium");
    let sleep = storage.create_condition("Sleep").unwrap();
    let calm = storage.create_condition("Calm").unwrap();

    // r1: purpose Sleep, benefit Calm, brand "Now Foods"
    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u1"),
            supplement_id: supp,
            score: 5,
            purposes: vec![sleep],
            benefits: vec![calm],
            brands: Some("Now Foods, Thorne".to_string()),
            ..Default::default()
        })
        .unwrap();
    // r2: purpose Sleep only, no brands
    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u2"),
            supplement_id: supp,
            score: 3,
            purposes: vec![sleep],
            ..Default::default()
        })
        .unwrap();
    // r3: benefit Calm only
    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u3"),
            supplement_id: supp,
            score: 1,
            benefits: vec![calm],
            ..Default::default()
        })
        .unwrap();

    let count_for = |pairs: &[(&str, &str)]| {
        let page = rank(&storage, &query(pairs)).unwrap();
        page.items.iter().find(|s| s.id == supp).unwrap().rating_count
    };

    assert_eq!(count_for(&[("conditions", "Sleep")]), 2);
    assert_eq!(count_for(&[("benefits", "Calm")]), 2);
    // AND across categories
    assert_eq!(count_for(&[("conditions", "Sleep"), ("benefits", "Calm")]), 1);
    // Brand substring is case-insensitive and ORs across names
    assert_eq!(count_for(&[("brands", "thorne")]), 1);
    assert_eq!(count_for(&[("brands", "thorne, missing")]), 1);
    assert_eq!(count_for(&[("conditions", "Sleep"), ("brands", "now")]), 1);
    // Condition names match exactly, case-sensitively
    assert_eq!(count_for(&[("conditions", "sleep")]), 0);
}

#[test]
fn test_dosage_and_frequency_filters() {
    let storage = test_storage();
    let supp = supplement(&storage, "Magnesium");

    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u1"),
            supplement_id: supp,
            score: 4,
            dosage: Some("200mg".to_string()),
            dosage_frequency: Some(2),
            frequency_unit: Some("daily".to_string()),
            ..Default::default()
        })
        .unwrap();
    storage
        .create_rating(&NewRating {
            user_id: user(&storage, "u2"),
            supplement_id: supp,
            score: 2,
            dosage: Some("400mg".to_string()),
            dosage_frequency: Some(1),
            frequency_unit: Some("daily".to_string()),
            ..Default::default()
        })
        .unwrap();

    let count_for = |pairs: &[(&str, &str)]| {
        let page = rank(&storage, &query(pairs)).unwrap();
        page.items.iter().find(|s| s.id == supp).unwrap().rating_count
    };

    assert_eq!(count_for(&[("dosage", "200mg")]), 1);
    assert_eq!(count_for(&[("frequency", "2_daily")]), 1);
    assert_eq!(count_for(&[("frequency", "1_daily")]), 1);
    // Malformed frequency degrades to a no-op, never an error
    assert_eq!(count_for(&[("frequency", "daily")]), 2);
    // Unknown filter keys are ignored
    assert_eq!(count_for(&[("flavour", "mint")]), 2);
}

#[test]
fn test_average_rounded_to_two_decimals() {
    let storage = test_storage();
    let supp = supplement(&storage, "Magnesium");
    for (name, score) in [("u1", 4), ("u2", 4), ("u3", 5)] {
        storage
            .create_rating(&NewRating {
                user_id: user(&storage, name),
                supplement_id: supp,
                score,
                ..Default::default()
            })
            .unwrap();
    }

    let page = rank(&storage, &RankQuery::default()).unwrap();
    assert_eq!(page.items[0].avg_rating, Some(4.33));
}

#[test]
fn test_paging_is_stable_under_ties() {
    // Six supplements with identical (null) aggregates: paging by 2 three
    // times must visit each exactly once, in name order.
    let storage = test_storage();
    for name in ["F", "B", "D", "A", "E", "C"] {
        supplement(&storage, name);
    }

    let mut seen = Vec::new();
    for page_no in 0..3 {
        let page = rank(
            &storage,
            &RankQuery {
                offset: page_no * 2,
                limit: 2,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(page.total, 6);
        seen.extend(page.items.iter().map(|s| s.name.clone()));
    }
    assert_eq!(seen, vec!["A", "B", "C", "D", "E", "F"]);
}

#[test]
fn test_name_search_narrows_supplements() {
    let storage = test_storage();
    supplement(&storage, "Magnesium Glycinate");
    supplement(&storage, "Magnesium Citrate");
    supplement(&storage, "Zinc");

    let page = rank(
        &storage,
        &RankQuery {
            name_search: Some("magnesium".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 2);
    assert!(page.items.iter().all(|s| s.name.contains("Magnesium")));
}

#[test]
fn test_explicit_field_sort() {
    let storage = test_storage();
    storage.create_supplement("Zinc", "Minerals", None).unwrap();
    storage.create_supplement("Ashwagandha", "Herbs", None).unwrap();

    let page = rank(
        &storage,
        &RankQuery {
            sort: SortKey::parse(Some("category:desc")),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(page.items[0].category, "Minerals");
    assert_eq!(page.items[1].category, "Herbs");
}
