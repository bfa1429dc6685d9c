//! Property tests for store invariants under arbitrary operation sequences.

use proptest::prelude::*;
use strata_store::{Locality, RecordKey, RecordState};
use strata_test_utils::assertions::assert_snapshot_consistent;
use strata_test_utils::fixtures::post_store;
use strata_test_utils::generators::{arb_attributes, arb_post_document, arb_value};

#[derive(Debug, Clone)]
enum Op {
    Create(u64, strata_store::Attributes),
    Push(strata_store::RecordDocument),
    SetTitle(u64, String),
    Unload(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        ((0u64..16), arb_attributes()).prop_map(|(id, attrs)| Op::Create(id, attrs)),
        arb_post_document().prop_map(Op::Push),
        ((0u64..16), "[a-z]{0,4}").prop_map(|(id, title)| Op::SetTitle(id, title)),
        (0u64..16).prop_map(Op::Unload),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Indexes stay consistent and peek_all never lists a key twice.
    #[test]
    fn prop_layers_stay_consistent(ops in prop::collection::vec(arb_op(), 1..40)) {
        let store = post_store();
        for op in ops {
            match op {
                Op::Create(id, attrs) => {
                    store.create_record("post", Some(id.into()), attrs).unwrap();
                }
                Op::Push(document) => store.push(document),
                Op::SetTitle(id, title) => {
                    if let Some(post) = store.peek_record("post", id) {
                        post.set_attribute("title", title).unwrap();
                    }
                }
                Op::Unload(id) => {
                    store.unload(&RecordKey::new("post", id));
                    prop_assert_eq!(store.record_state("post", id), RecordState::Absent);
                }
            }

            let snapshot = store.snapshot();
            assert_snapshot_consistent(&snapshot);

            let mut keys: Vec<RecordKey> =
                store.peek_all("post").iter().map(|m| m.key().clone()).collect();
            let listed = keys.len();
            keys.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
            keys.dedup();
            prop_assert_eq!(keys.len(), listed);
        }
    }

    /// A pushed document that repeats every local attribute leaves the record clean.
    #[test]
    fn prop_confirming_local_clears_dirty(
        canonical in arb_attributes(),
        local in arb_attributes(),
    ) {
        let store = post_store();
        store.push(strata_store::RecordDocument::new("post", 1u64, canonical));
        store
            .reference_for("post", 1u64, Locality::Local)
            .push(local)
            .unwrap();

        let key = RecordKey::new("post", 1u64);
        let current = store.document_for(&key, Locality::Local).unwrap();
        store.push(strata_store::RecordDocument::new(
            "post",
            1u64,
            current.attributes().clone(),
        ));

        let post = store.peek_record("post", 1u64).unwrap();
        prop_assert!(!post.state().has_dirty_attributes);
    }

    /// Fields the user never edited always follow the latest canonical push.
    #[test]
    fn prop_unedited_fields_follow_canonical(
        first in arb_attributes(),
        edit in arb_value(),
        second in arb_attributes(),
    ) {
        let store = post_store();
        store.push(strata_store::RecordDocument::new("post", 1u64, first));
        let mut patch = strata_store::Attributes::new();
        patch.insert("title".to_string(), edit);
        store
            .reference_for("post", 1u64, Locality::Local)
            .push(patch)
            .unwrap();

        store.push(strata_store::RecordDocument::new("post", 1u64, second));

        let key = RecordKey::new("post", 1u64);
        let canonical = store.document_for(&key, Locality::Canonical).unwrap();
        let local = store.document_for(&key, Locality::Local).unwrap();
        let names: std::collections::BTreeSet<&String> = canonical
            .attributes()
            .keys()
            .chain(local.attributes().keys())
            .collect();
        for name in names.into_iter().filter(|name| name.as_str() != "title") {
            prop_assert_eq!(local.attribute(name), canonical.attribute(name), "attribute {}", name);
        }
    }
}
