//! Property-based tests for keel-core using proptest.

use keel_core::{HKey, Value};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn hash_of(v: &Value) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

proptest! {
    /// Value ordering is antisymmetric, and equal values hash alike.
    #[test]
    fn value_order_is_consistent(a in value_strategy(), b in value_strategy()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        if a == b {
            prop_assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    /// Sorting values twice yields the same order.
    #[test]
    fn value_sort_is_stable(mut values in prop::collection::vec(value_strategy(), 0..50)) {
        values.sort();
        let again = { let mut v = values.clone(); v.sort(); v };
        prop_assert_eq!(values, again);
    }

    /// A child key always sorts after its parent and before the parent's next sibling.
    #[test]
    fn hkey_children_sort_between_siblings(parent in 0i64..1000, child in any::<i64>()) {
        let p = HKey::new().with_segment(1, vec![Value::Int64(parent)]);
        let c = p.clone().with_segment(2, vec![Value::Int64(child)]);
        let sibling = HKey::new().with_segment(1, vec![Value::Int64(parent + 1)]);
        prop_assert!(p < c);
        prop_assert!(c < sibling);
        prop_assert!(p.is_ancestor_of(&c));
    }
}
