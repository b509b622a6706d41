use proptest::prelude::*;
use tagsieve::{Expr, Id, QueryIndex};

const KEYS: &[&str] = &["app", "dev", "region", "zone"];
const VALUES: &[&str] = &["foo", "bar", "baz", "sda", "sdb", "us", "eu"];
const NAMES: &[&str] = &["cpu", "mem", "disk.read", "disk.write", "net"];
const NAME_PATTERNS: &[&str] = &["^cpu", "^disk\\..*", "^m.m", "^.*e"];
const VALUE_PATTERNS: &[&str] = &["^f", "^ba.*", "^s.a", "^us$"];

fn leaf() -> impl Strategy<Value = Expr> {
    let key = prop::sample::select(KEYS);
    let value = prop::sample::select(VALUES);
    prop_oneof![
        prop::sample::select(NAMES).prop_map(|n| Expr::eq("name", n)),
        prop::sample::select(NAME_PATTERNS)
            .prop_map(|p| Expr::re("name", p).expect("name pattern")),
        (key.clone(), prop::sample::select(VALUE_PATTERNS))
            .prop_map(|(k, p)| Expr::re(k, p).expect("value pattern")),
        (key.clone(), value.clone()).prop_map(|(k, v)| Expr::eq(k, v)),
        (key.clone(), value.clone()).prop_map(|(k, v)| Expr::ne(k, v)),
        (key.clone(), value.clone()).prop_map(|(k, v)| Expr::gt(k, v)),
        (key.clone(), value.clone()).prop_map(|(k, v)| Expr::lt(k, v)),
        (
            key.clone(),
            prop::collection::btree_set(prop::sample::select(VALUES), 1..3)
        )
            .prop_map(|(k, vs)| Expr::in_set(k, vs)),
        key.prop_map(Expr::has),
    ]
}

fn expr() -> impl Strategy<Value = Expr> {
    leaf().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.or(b)),
            inner.prop_map(|e| e.not()),
        ]
    })
}

fn id() -> impl Strategy<Value = Id> {
    (
        prop::sample::select(NAMES),
        prop::collection::vec(
            (prop::sample::select(KEYS), prop::sample::select(VALUES)),
            0..4,
        ),
    )
        .prop_map(|(name, tags)| {
            let mut id = Id::new(name);
            for (k, v) in tags {
                id = id.with_tag(k, v);
            }
            id
        })
}

proptest! {
    /// Soundness, completeness, dedup, ordered/unordered equivalence, cache
    /// transparency, and could-match safety, all against direct expression
    /// evaluation as the oracle.
    #[test]
    fn index_agrees_with_direct_evaluation(
        queries in prop::collection::vec(expr(), 1..6),
        ids in prop::collection::vec(id(), 1..6),
    ) {
        let idx = QueryIndex::new();
        for (i, q) in queries.iter().enumerate() {
            idx.add(q, i);
        }

        for id in &ids {
            let expected: Vec<usize> = queries
                .iter()
                .enumerate()
                .filter(|(_, q)| q.matches_id(id))
                .map(|(i, _)| i)
                .collect();

            let got = idx.find_matches(id);
            prop_assert!(
                got.windows(2).all(|w| w[0] != w[1]) && got.iter().collect::<std::collections::HashSet<_>>().len() == got.len(),
                "duplicate values for {id}: {got:?}"
            );
            let mut got = got;
            got.sort_unstable();
            prop_assert_eq!(&got, &expected, "identity walk disagrees for {}", id);

            let mut via_fn = idx.find_matches_with(|key| id.tag(key));
            via_fn.sort_unstable();
            prop_assert_eq!(&via_fn, &expected, "tag lookup disagrees for {}", id);

            if !expected.is_empty() {
                prop_assert!(idx.could_match(|key| id.tag(key)), "could_match denied {}", id);
                // A partial view (name only) must stay conservative.
                prop_assert!(
                    idx.could_match(|key: &str| if key == "name" { id.tag("name") } else { None }),
                    "could_match denied partial view of {}",
                    id
                );
            }

            // Warm pass over the now-populated caches is identical.
            let mut again = idx.find_matches(id);
            again.sort_unstable();
            prop_assert_eq!(&again, &expected, "cached walk disagrees for {}", id);
        }
    }

    /// Adding then removing every registration restores structural
    /// emptiness.
    #[test]
    fn add_remove_round_trip_restores_emptiness(
        queries in prop::collection::vec(expr(), 1..8),
    ) {
        let idx = QueryIndex::new();
        for (i, q) in queries.iter().enumerate() {
            idx.add(q, i);
        }
        for (i, q) in queries.iter().enumerate() {
            idx.remove(q, &i);
        }
        prop_assert!(idx.is_empty(), "index not empty:\n{idx}");
    }

    /// Removing one registration leaves the rest answering as before.
    #[test]
    fn removal_is_isolated(
        queries in prop::collection::vec(expr(), 2..6),
        ids in prop::collection::vec(id(), 1..4),
    ) {
        let idx = QueryIndex::new();
        for (i, q) in queries.iter().enumerate() {
            idx.add(q, i);
        }
        idx.remove(&queries[0], &0usize);

        for id in &ids {
            let expected: Vec<usize> = queries
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, q)| q.matches_id(id))
                .map(|(i, _)| i)
                .collect();
            let mut got = idx.find_matches(id);
            got.sort_unstable();
            prop_assert_eq!(&got, &expected, "after removal, disagrees for {}", id);
        }
    }
}
