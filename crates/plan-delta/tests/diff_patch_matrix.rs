use indexmap::IndexMap;
use plan_delta::{diff, patch, patch_inplace, transfer, Delta, FieldDelta};
use serde_json::{json, Value};

fn map(fields: Vec<(&str, FieldDelta)>) -> Delta {
    Delta::Map(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<IndexMap<_, _>>(),
    )
}

fn edit(delta: Delta) -> FieldDelta {
    FieldDelta::Edit(delta)
}

fn replace(value: Value) -> Delta {
    Delta::Replace(value)
}

#[test]
fn diff_of_equal_scalars_and_arrays_is_none() {
    assert_eq!(diff(&json!(1), &json!(1)), None);
    assert_eq!(diff(&json!("abc"), &json!("abc")), None);
    assert_eq!(diff(&json!(true), &json!(true)), None);
    assert_eq!(diff(&json!([1, 2, 4]), &json!([1, 2, 4])), None);
}

#[test]
fn diff_of_unequal_scalars_and_arrays_replaces_wholesale() {
    assert_eq!(diff(&json!(1), &json!(2)), Some(replace(json!(2))));
    assert_eq!(diff(&json!("abc"), &json!("abd")), Some(replace(json!("abd"))));
    assert_eq!(diff(&json!(true), &json!(false)), Some(replace(json!(false))));
    assert_eq!(
        diff(&json!([1, 2, 4]), &json!([1, 3, 4])),
        Some(replace(json!([1, 3, 4])))
    );
}

#[test]
fn diff_of_equal_nested_objects_is_none() {
    let a = json!({"a": {"b": {"c": 2, "d": [3, 4]}, "e": 4}, "f": 5, "g": "x"});
    assert_eq!(diff(&a, &a.clone()), None);
}

#[test]
fn diff_of_structurally_equal_objects_keeps_only_changed_keys() {
    assert_eq!(
        diff(
            &json!({"a": 1, "b": "hello", "c": [2, 3]}),
            &json!({"a": 1, "b": "abc", "c": [3, 3]})
        ),
        Some(map(vec![
            ("b", edit(replace(json!("abc")))),
            ("c", edit(replace(json!([3, 3])))),
        ]))
    );

    let expected = map(vec![
        (
            "a",
            edit(map(vec![(
                "b",
                edit(map(vec![("c", edit(replace(json!("x"))))])),
            )])),
        ),
        ("g", edit(replace(json!("y")))),
    ]);
    assert_eq!(
        diff(
            &json!({"a": {"b": {"c": 2, "d": [3, 4]}, "e": 4}, "f": 5, "g": "x"}),
            &json!({"a": {"b": {"c": "x", "d": [3, 4]}, "e": 4}, "f": 5, "g": "y"})
        ),
        Some(expected)
    );
}

#[test]
fn diff_marks_additions_and_removals() {
    assert_eq!(
        diff(
            &json!({"a": 1, "b": "hello", "c": [2, 3]}),
            &json!({"a": 1, "b": "hello", "d": [2, 3]})
        ),
        Some(map(vec![
            ("d", FieldDelta::Add(json!([2, 3]))),
            ("c", FieldDelta::Remove),
        ]))
    );

    assert_eq!(
        diff(
            &json!({"a": {"b": {"c": 2, "d": [3, 4]}, "e": 4}, "f": 5, "g": "x"}),
            &json!({"a": {"e": 4}, "h": {"i": 1}, "f": 5, "g": "x"})
        ),
        Some(map(vec![
            ("a", edit(map(vec![("b", FieldDelta::Remove)]))),
            ("h", FieldDelta::Add(json!({"i": 1}))),
        ]))
    );

    assert_eq!(
        diff(
            &json!({"b": {"x": 1}, "c": {"x": 1}, "d": {"x": 1}}),
            &json!({"b": {"x": 1, "a": true}, "c": {"x": 1}, "d": {"x": 1}})
        ),
        Some(map(vec![(
            "b",
            edit(map(vec![("a", FieldDelta::Add(json!(true)))]))
        )]))
    );
}

#[test]
fn diff_skips_null_valued_target_keys() {
    // A field set to null is indistinguishable from an absent field, so it
    // produces neither an edit nor a removal.
    assert_eq!(diff(&json!({"a": 1}), &json!({"a": null})), None);
    assert_eq!(diff(&json!({}), &json!({"a": null})), None);
}

#[test]
fn patch_with_none_clones_the_source() {
    assert_eq!(patch(&json!(1), None), json!(1));
    assert_eq!(patch(&json!("a"), None), json!("a"));
    assert_eq!(patch(&json!([1, 2]), None), json!([1, 2]));
    assert_eq!(patch(&json!({"a": 1, "b": "x"}), None), json!({"a": 1, "b": "x"}));
}

#[test]
fn patch_applies_wholesale_replacement() {
    assert_eq!(patch(&json!(1), Some(&replace(json!(2)))), json!(2));
    assert_eq!(
        patch(&json!([1, 2]), Some(&replace(json!([3, 4, 5])))),
        json!([3, 4, 5])
    );
}

#[test]
fn patch_applies_nested_edits_without_touching_other_keys() {
    let delta = map(vec![
        (
            "a",
            edit(map(vec![(
                "b",
                edit(map(vec![("c", edit(replace(json!("x"))))])),
            )])),
        ),
        ("g", edit(replace(json!("y")))),
    ]);

    assert_eq!(
        patch(
            &json!({"a": {"b": {"c": 2, "d": [3, 4]}, "e": 4}, "f": 5, "g": "x"}),
            Some(&delta)
        ),
        json!({"a": {"b": {"c": "x", "d": [3, 4]}, "e": 4}, "f": 5, "g": "y"})
    );
}

#[test]
fn patch_applies_additions_and_removals() {
    let delta = map(vec![
        ("a", edit(map(vec![("b", FieldDelta::Remove)]))),
        ("h", FieldDelta::Add(json!({"i": 1}))),
    ]);

    assert_eq!(
        patch(
            &json!({"a": {"b": {"c": 2, "d": [3, 4]}, "e": 4}, "f": 5, "g": "x"}),
            Some(&delta)
        ),
        json!({"a": {"e": 4}, "h": {"i": 1}, "f": 5, "g": "x"})
    );

    assert_eq!(
        patch(&json!({"x": 1}), Some(&map(vec![("y", FieldDelta::Add(json!(2)))]))),
        json!({"x": 1, "y": 2})
    );
    assert_eq!(
        patch(&json!({"x": 1, "y": 2}), Some(&map(vec![("y", FieldDelta::Remove)]))),
        json!({"x": 1})
    );
}

#[test]
fn patch_inplace_rejects_map_delta_on_non_map_target() {
    let mut target = json!(42);
    let delta = map(vec![("a", FieldDelta::Add(json!(1)))]);
    assert!(!patch_inplace(&mut target, &delta));
    assert_eq!(target, json!(42), "incompatible target must stay untouched");
}

#[test]
fn patch_inplace_add_on_existing_key_is_a_noop() {
    let mut target = json!({"a": 1});
    let delta = map(vec![("a", FieldDelta::Add(json!(99)))]);
    assert!(patch_inplace(&mut target, &delta));
    assert_eq!(target, json!({"a": 1}));
}

#[test]
fn transfer_makes_destination_equal_and_reports_change() {
    let from = json!({"a": {"b": 2}, "c": [1, 2]});
    let mut to = json!({"a": {"b": 1}, "d": true});

    assert!(transfer(&from, &mut to), "differing values must report change");
    assert_eq!(to, from);

    let mut already = from.clone();
    assert!(!transfer(&from, &mut already), "equal values must report no change");
    assert_eq!(already, from);
}

#[test]
fn delta_serde_round_trips_through_json() {
    let delta = diff(
        &json!({"a": {"b": {"c": 2, "d": [3, 4]}, "e": 4}, "f": 5}),
        &json!({"a": {"e": 4}, "h": {"i": 1}, "f": 6}),
    )
    .expect("non-trivial delta expected");

    let text = serde_json::to_string(&delta).expect("delta must serialize");
    let back: Delta = serde_json::from_str(&text).expect("delta must deserialize");
    assert_eq!(back, delta);
}
