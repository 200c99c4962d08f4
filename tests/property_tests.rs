/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use proptest::prelude::*;
use rust_kommo_api::audio_format::{detect_audio_format, AudioFormat};
use rust_kommo_api::field_updater::merge_message_field;
use rust_kommo_api::models::CustomFieldValues;
use rust_kommo_api::nested_form::parse_nested_form;

// Property: the form parser never panics, whatever the keys look like
proptest! {
    #[test]
    fn form_parser_never_panics(
        pairs in prop::collection::vec(("\\PC{0,24}", "\\PC{0,8}"), 0..16)
    ) {
        let _ = parse_nested_form(pairs);
    }

    #[test]
    fn bracketed_keys_never_panic(
        pairs in prop::collection::vec(("[a-c\\[\\]0-9]{1,12}", "[a-z]{0,4}"), 0..16)
    ) {
        let _ = parse_nested_form(pairs);
    }
}

// Property: the resulting tree does not depend on the order of the pairs
proptest! {
    #[test]
    fn nested_maps_are_order_independent(
        (pairs, shuffled) in prop::collection::btree_map(
            ("[a-c]", "[x-z]"),
            "[a-z]{1,5}",
            1..9,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|((outer, inner), value)| (format!("root[{}][{}]", outer, inner), value))
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|pairs| (Just(pairs.clone()), Just(pairs).prop_shuffle()))
    ) {
        prop_assert_eq!(
            parse_nested_form(pairs).unwrap(),
            parse_nested_form(shuffled).unwrap()
        );
    }

    #[test]
    fn sparse_lists_are_order_independent(
        (pairs, shuffled) in prop::collection::btree_map(
            (0usize..8, "[a-b]"),
            "[a-z]{1,5}",
            1..10,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|((index, field), value)| (format!("items[{}][{}]", index, field), value))
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|pairs| (Just(pairs.clone()), Just(pairs).prop_shuffle()))
    ) {
        let tree = parse_nested_form(pairs.clone()).unwrap();
        prop_assert_eq!(&tree, &parse_nested_form(shuffled).unwrap());

        // Lists are padded up to the highest index seen
        let highest = pairs
            .iter()
            .filter_map(|(key, _)| key[6..].split(']').next()?.parse::<usize>().ok())
            .max()
            .unwrap();
        prop_assert_eq!(tree.get("items").unwrap().as_list().unwrap().len(), highest + 1);
    }
}

// Property: the audio sniffer is total and respects rule priority
proptest! {
    #[test]
    fn audio_detection_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = detect_audio_format(&bytes);
    }

    #[test]
    fn short_buffers_are_unknown(bytes in prop::collection::vec(any::<u8>(), 0..12)) {
        prop_assert_eq!(detect_audio_format(&bytes), AudioFormat::Unknown);
    }

    #[test]
    fn id3_prefix_is_always_mp3(tail in prop::collection::vec(any::<u8>(), 9..64)) {
        let mut bytes = b"ID3".to_vec();
        bytes.extend(tail);
        prop_assert_eq!(detect_audio_format(&bytes), AudioFormat::Mp3);
    }
}

// Property: merging appends exactly one line to an existing value
proptest! {
    #[test]
    fn merge_appends_after_newline(
        current in "[a-zA-Z0-9 ]{1,40}",
        text in "[a-zA-Z0-9 ]{0,40}",
        field_id in 1i64..1_000_000,
    ) {
        let existing = vec![CustomFieldValues::text(field_id, current.clone())];
        let merged = merge_message_field(Some(existing.as_slice()), field_id, &text);
        prop_assert_eq!(merged.field_id, field_id);
        prop_assert_eq!(merged.first_value_text(), format!("{}\n{}", current, text));
    }
}
