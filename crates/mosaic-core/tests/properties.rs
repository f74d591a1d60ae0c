use mosaic_core::{ComposeConfig, Composer, Parallelism};
use mosaic_schema::{Body, EnablePolicy, Fragment, Origin, Priority, PriorityBounds, Value};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const IDS: [&str; 3] = ["packages", "path", "shell"];

#[derive(Debug, Clone)]
struct Spec {
    id: usize,
    tag: u8,
    priority: u32,
    policy: EnablePolicy,
    items: Vec<String>,
    flag: bool,
}

fn spec() -> impl Strategy<Value = Spec> {
    (
        0..IDS.len(),
        0..5u8,
        prop::sample::select(vec![10u32, 20, 1000]),
        prop::sample::select(vec![
            EnablePolicy::Any,
            EnablePolicy::Precedence,
            EnablePolicy::Exclusive,
        ]),
        prop::collection::vec("[a-d]", 0..3),
        any::<bool>(),
    )
        .prop_map(|(id, tag, priority, policy, items, flag)| Spec {
            id,
            tag,
            priority,
            policy,
            items,
            flag,
        })
}

fn build(specs: &[Spec]) -> Vec<Fragment> {
    specs
        .iter()
        .enumerate()
        .map(|(position, s)| {
            let value = match s.tag {
                0 => Value::string_set(s.items.clone()),
                1 => Value::string_list(s.items.clone()),
                2 => Value::flag(s.flag),
                3 => Value::str(s.items.first().cloned().unwrap_or_default()),
                _ => Value::Mapping(
                    s.items
                        .iter()
                        .map(|key| (key.clone(), Value::bool(s.flag)))
                        .collect(),
                ),
            };
            Fragment::builder(IDS[s.id], Body::Literal(value))
                .priority(Priority::new(s.priority))
                .policy(s.policy)
                .origin(Origin::new("prop", position as u32))
                .build(&PriorityBounds::default())
                .unwrap()
        })
        .collect()
}

fn shuffled_specs() -> impl Strategy<Value = (Vec<Fragment>, Vec<Fragment>)> {
    prop::collection::vec(spec(), 0..12).prop_flat_map(|specs| {
        let fragments = build(&specs);
        (Just(fragments.clone()), Just(fragments).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn input_order_does_not_change_the_outcome((original, shuffled) in shuffled_specs()) {
        let composer = Composer::default();
        let a = composer.compose(original);
        let b = composer.compose(shuffled);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn parallel_outcome_matches_sequential((original, _) in shuffled_specs()) {
        let sequential = Composer::default().compose(original.clone());
        let parallel = Composer::new(ComposeConfig::new().with_parallelism(Parallelism::Threads(3)))
            .compose(original);
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn mapping_keys_compose_independently(
        strong in prop::collection::btree_map("[a-c]", "[a-z]{1,3}", 0..3),
        weak in prop::collection::btree_map("[a-e]", "[a-z]{1,3}", 0..4),
    ) {
        let mapping = |entries: &BTreeMap<String, String>| {
            Value::Mapping(entries.iter().map(|(k, v)| (k.clone(), Value::str(v.clone()))).collect())
        };
        let per_key = |id: &str, entries: &BTreeMap<String, String>, priority: u32| {
            entries
                .iter()
                .map(|(k, v)| {
                    Fragment::builder(format!("{id}.{k}"), Body::Literal(Value::str(v.clone())))
                        .priority(Priority::new(priority))
                        .build(&PriorityBounds::default())
                        .unwrap()
                })
                .collect::<Vec<_>>()
        };

        let whole = Composer::default().compose(vec![
            Fragment::builder("env", Body::Literal(mapping(&strong)))
                .priority(Priority::new(10))
                .build(&PriorityBounds::default())
                .unwrap(),
            Fragment::builder("env", Body::Literal(mapping(&weak)))
                .priority(Priority::new(20))
                .build(&PriorityBounds::default())
                .unwrap(),
        ]).unwrap();
        let mut split = per_key("env", &strong, 10);
        split.extend(per_key("env", &weak, 20));
        let split = Composer::default().compose(split).unwrap();

        let Some(Value::Mapping(entries)) = whole.get("env") else {
            panic!("expected mapping");
        };
        prop_assert_eq!(entries.len(), split.len());
        for (key, value) in entries {
            prop_assert_eq!(split.get(&format!("env.{key}")), Some(value));
        }
    }

    #[test]
    fn set_composition_is_union(
        left in prop::collection::btree_set("[a-z]{1,4}", 0..6),
        right in prop::collection::btree_set("[a-z]{1,4}", 0..6),
    ) {
        let fragments = vec![
            Fragment::literal("packages", Value::string_set(left.clone())).unwrap(),
            Fragment::literal("packages", Value::string_set(right.clone())).unwrap(),
        ];
        let descriptor = Composer::default().compose(fragments).unwrap();
        let expected: BTreeSet<String> = left.union(&right).cloned().collect();
        prop_assert_eq!(descriptor.get("packages"), Some(&Value::string_set(expected)));
    }
}
