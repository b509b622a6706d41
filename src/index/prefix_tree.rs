use crate::query::KeyQuery;
use std::collections::{HashMap, HashSet};

/// Byte trie from literal prefixes to the key predicates registered under
/// them. Walking a probe value yields every predicate whose prefix is a
/// prefix of the probe, so expensive checks (regex, ranges) are only
/// evaluated for plausible candidates.
///
/// `In`-style predicates are stored once per member under the member's full
/// value and only surface on an exact hit: the traversal accepts `In`
/// candidates without re-checking membership, so a prefix-based slot (the
/// members' common prefix) would admit values outside the set.
#[derive(Debug, Default)]
pub(crate) struct PrefixTree {
    root: Node,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<u8, Node>,
    /// Matched whenever this node lies on the probe's path.
    prefix_queries: HashSet<KeyQuery>,
    /// Matched only when the probe ends exactly at this node.
    exact_queries: HashSet<KeyQuery>,
}

impl PrefixTree {
    /// Register a predicate. Returns true iff the stored set changed.
    pub fn put(&mut self, kq: &KeyQuery) -> bool {
        match kq.in_members() {
            Some(members) => {
                let mut changed = false;
                for member in members {
                    changed |= self.root.insert(member.as_bytes(), kq, true);
                }
                changed
            }
            None => self.root.insert(kq.prefix().as_bytes(), kq, false),
        }
    }

    /// Unregister a predicate. Returns true iff the stored set changed.
    pub fn remove(&mut self, kq: &KeyQuery) -> bool {
        match kq.in_members() {
            Some(members) => {
                let mut changed = false;
                for member in members {
                    changed |= self.root.remove(member.as_bytes(), kq, true);
                }
                changed
            }
            None => self.root.remove(kq.prefix().as_bytes(), kq, false),
        }
    }

    /// Invoke `f` for every predicate that applies to `probe`.
    pub fn for_each(&self, probe: &str, mut f: impl FnMut(&KeyQuery)) {
        self.walk(probe, &mut |kq| {
            f(kq);
            false
        });
    }

    /// Short-circuiting form of `for_each`.
    pub fn exists(&self, probe: &str, mut pred: impl FnMut(&KeyQuery) -> bool) -> bool {
        self.walk(probe, &mut pred)
    }

    fn walk(&self, probe: &str, f: &mut dyn FnMut(&KeyQuery) -> bool) -> bool {
        let mut node = &self.root;
        for kq in &node.prefix_queries {
            if f(kq) {
                return true;
            }
        }
        for byte in probe.bytes() {
            match node.children.get(&byte) {
                Some(child) => {
                    node = child;
                    for kq in &node.prefix_queries {
                        if f(kq) {
                            return true;
                        }
                    }
                }
                None => return false,
            }
        }
        for kq in &node.exact_queries {
            if f(kq) {
                return true;
            }
        }
        false
    }
}

impl Node {
    fn insert(&mut self, path: &[u8], kq: &KeyQuery, exact: bool) -> bool {
        match path.split_first() {
            None => {
                let set = if exact {
                    &mut self.exact_queries
                } else {
                    &mut self.prefix_queries
                };
                set.insert(kq.clone())
            }
            Some((byte, rest)) => self.children.entry(*byte).or_default().insert(rest, kq, exact),
        }
    }

    fn remove(&mut self, path: &[u8], kq: &KeyQuery, exact: bool) -> bool {
        match path.split_first() {
            None => {
                let set = if exact {
                    &mut self.exact_queries
                } else {
                    &mut self.prefix_queries
                };
                set.remove(kq)
            }
            Some((byte, rest)) => {
                let Some(child) = self.children.get_mut(byte) else {
                    return false;
                };
                let changed = child.remove(rest, kq, exact);
                if changed && child.is_unused() {
                    self.children.remove(byte);
                }
                changed
            }
        }
    }

    fn is_unused(&self) -> bool {
        self.children.is_empty() && self.prefix_queries.is_empty() && self.exact_queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::PrefixTree;
    use crate::query::{Expr, KeyQuery};

    fn regex(key: &str, pattern: &str) -> KeyQuery {
        match Expr::re(key, pattern).expect("pattern") {
            Expr::Key(kq) => kq,
            _ => unreachable!(),
        }
    }

    fn collect(tree: &PrefixTree, probe: &str) -> Vec<KeyQuery> {
        let mut out = Vec::new();
        tree.for_each(probe, |kq| out.push(kq.clone()));
        out
    }

    #[test]
    fn prefix_entries_match_any_extension() {
        let mut tree = PrefixTree::default();
        let disk = regex("name", "^disk.*");
        assert!(tree.put(&disk));
        assert!(!tree.put(&disk));

        assert_eq!(collect(&tree, "disk"), vec![disk.clone()]);
        assert_eq!(collect(&tree, "disk.read"), vec![disk.clone()]);
        assert!(collect(&tree, "dis").is_empty());
        assert!(collect(&tree, "network").is_empty());
    }

    #[test]
    fn empty_prefix_entries_always_match() {
        let mut tree = PrefixTree::default();
        let ne = KeyQuery::Ne("region".into(), "us".into());
        assert!(tree.put(&ne));
        assert_eq!(collect(&tree, "anything"), vec![ne.clone()]);
        assert_eq!(collect(&tree, ""), vec![ne]);
    }

    #[test]
    fn in_entries_only_match_exact_members() {
        let mut tree = PrefixTree::default();
        let devs = KeyQuery::In("dev".into(), ["sda".into(), "sdb".into()].into());
        assert!(tree.put(&devs));

        assert_eq!(collect(&tree, "sda"), vec![devs.clone()]);
        assert_eq!(collect(&tree, "sdb"), vec![devs.clone()]);
        assert!(collect(&tree, "sdc").is_empty());
        // A strict extension of a member is not a member.
        assert!(collect(&tree, "sda2").is_empty());
        assert!(collect(&tree, "sd").is_empty());
    }

    #[test]
    fn remove_prunes_unused_nodes() {
        let mut tree = PrefixTree::default();
        let disk = regex("name", "^disk.*");
        let devs = KeyQuery::In("dev".into(), ["sda".into()].into());
        tree.put(&disk);
        tree.put(&devs);

        assert!(tree.remove(&disk));
        assert!(!tree.remove(&disk));
        assert!(collect(&tree, "disk.read").is_empty());
        assert_eq!(collect(&tree, "sda"), vec![devs.clone()]);

        assert!(tree.remove(&devs));
        assert!(collect(&tree, "sda").is_empty());
    }

    #[test]
    fn exists_short_circuits() {
        let mut tree = PrefixTree::default();
        tree.put(&KeyQuery::Ne("a".into(), "1".into()));
        tree.put(&regex("name", "^cpu"));

        let mut calls = 0;
        let hit = tree.exists("cpu.user", |_| {
            calls += 1;
            true
        });
        assert!(hit);
        assert_eq!(calls, 1);
        assert!(!tree.exists("zzz", |kq| kq.is_regex()));
    }
}
