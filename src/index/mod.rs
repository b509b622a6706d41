pub mod cache;
mod prefix_tree;

use crate::id::{Id, NAME_KEY, compare_keys};
use crate::query::{Expr, KeyQuery};
use cache::{CacheSupplier, LruCacheSupplier, ResultCache};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use prefix_tree::PrefixTree;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

/// Index for efficiently matching an [`Id`] against a set of queries that
/// are known in advance. The index is thread safe for lookups; updates must
/// be serialized to a single writer at a time.
///
/// Each node examines one tag key. A registered conjunction is threaded
/// through the tree in key order (`name` first, then lexicographic), and a
/// lookup walks an identity's tags in the same order, so matching is linear
/// in the identity size rather than the number of registered queries.
pub struct QueryIndex<V> {
    cache_supplier: Arc<dyn CacheSupplier<V>>,

    /// Tag key examined at this node. Unset only on freshly created interior
    /// nodes; assigned by the first insertion that reaches them.
    key: OnceCell<String>,

    /// Children for exact-value predicates, by tag value.
    equal_checks: DashMap<String, Arc<QueryIndex<V>>>,

    /// Children for non-equality predicates (regex, in, ranges, inverted).
    /// The prefix tree prunes candidates by literal prefix and the result
    /// cache memoizes which children applied for a probed value, so the
    /// expensive checks run as rarely as possible.
    other_checks: DashMap<KeyQuery, Arc<QueryIndex<V>>>,
    other_checks_tree: RwLock<PrefixTree>,
    other_checks_cache: Box<dyn ResultCache<V>>,

    /// Child reached when a predicate is satisfied by mere key presence.
    has_key_idx: RwLock<Option<Arc<QueryIndex<V>>>>,

    /// Child holding conjunctions whose next unresolved predicate is on a
    /// key sorting after this node's key.
    other_keys_idx: RwLock<Option<Arc<QueryIndex<V>>>>,

    /// Child holding conjunctions whose next predicate is satisfied when
    /// this node's key is absent.
    missing_keys_idx: RwLock<Option<Arc<QueryIndex<V>>>>,

    /// Values whose conjunction was fully consumed at this node.
    matches: RwLock<im::HashSet<V>>,
}

impl<V> QueryIndex<V>
where
    V: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// New empty index with the default result-cache supplier.
    pub fn new() -> Self {
        Self::with_cache_supplier(Arc::new(LruCacheSupplier::default()))
    }

    /// New empty index. The supplied caches memoize the results of regex and
    /// other non-equality checks to avoid scans for string values repeated
    /// across many identities.
    pub fn with_cache_supplier(cache_supplier: Arc<dyn CacheSupplier<V>>) -> Self {
        // The root examines `name` so identity traversal starts correctly.
        Self::node(cache_supplier, Some(NAME_KEY.to_string()))
    }

    fn empty(cache_supplier: Arc<dyn CacheSupplier<V>>) -> Arc<Self> {
        Arc::new(Self::node(cache_supplier, None))
    }

    fn node(cache_supplier: Arc<dyn CacheSupplier<V>>, key: Option<String>) -> Self {
        Self {
            other_checks_cache: cache_supplier.create(),
            cache_supplier,
            key: match key {
                Some(key) => OnceCell::with_value(key),
                None => OnceCell::new(),
            },
            equal_checks: DashMap::new(),
            other_checks: DashMap::new(),
            other_checks_tree: RwLock::new(PrefixTree::default()),
            has_key_idx: RwLock::new(None),
            other_keys_idx: RwLock::new(None),
            missing_keys_idx: RwLock::new(None),
            matches: RwLock::new(im::HashSet::new()),
        }
    }

    /// Register `value` to be returned for identities matching `query`.
    pub fn add(&self, query: &Expr, value: V) -> &Self {
        let clauses = query.dnf_list();
        debug!(%query, clauses = clauses.len(), "registering query");
        for clause in clauses {
            match clause {
                Expr::True => {
                    self.matches.write().insert(value.clone());
                }
                Expr::False => {}
                clause => {
                    let queries = sort_clause(&clause);
                    self.add_sorted(&queries, 0, &value);
                }
            }
        }
        self
    }

    fn add_sorted(&self, queries: &[KeyQuery], i: usize, value: &V) {
        if i >= queries.len() {
            self.matches.write().insert(value.clone());
            return;
        }
        let (kq, j) = fold_same_key(queries, i);

        let key = self.key.get_or_init(|| kq.key().to_string());
        if key == kq.key() {
            match &kq {
                KeyQuery::Eq(_, v) => {
                    let idx = self
                        .equal_checks
                        .entry(v.clone())
                        .or_insert_with(|| Self::empty(Arc::clone(&self.cache_supplier)))
                        .value()
                        .clone();
                    idx.add_sorted(queries, j, value);
                }
                KeyQuery::Has(_) => {
                    self.get_or_create(&self.has_key_idx)
                        .add_sorted(queries, j, value);
                }
                _ => {
                    let idx = self
                        .other_checks
                        .entry(kq.clone())
                        .or_insert_with(|| Self::empty(Arc::clone(&self.cache_supplier)))
                        .value()
                        .clone();
                    idx.add_sorted(queries, j, value);
                    if self.other_checks_tree.write().put(&kq) {
                        trace!(key = %key, "other-checks set changed, clearing result cache");
                        self.other_checks_cache.clear();
                    }

                    // Inverted predicates also hold when the key is missing
                    // from the identity, so the remainder is indexed under
                    // the missing-keys branch as well.
                    if kq.matches_empty() {
                        self.get_or_create(&self.missing_keys_idx)
                            .add_sorted(queries, j, value);
                    }
                }
            }
        } else {
            // The clause continues on a key that sorts after this node's
            // key; resolve it further down with the cursor unchanged.
            self.get_or_create(&self.other_keys_idx)
                .add_sorted(queries, i, value);
        }
    }

    /// Unregister `value` for `query`. Returns true if a value was removed
    /// along any branch.
    pub fn remove(&self, query: &Expr, value: &V) -> bool {
        let mut removed = false;
        for clause in query.dnf_list() {
            match clause {
                Expr::True => {
                    removed |= self.matches.write().remove(value).is_some();
                }
                Expr::False => {}
                clause => {
                    let queries = sort_clause(&clause);
                    removed |= self.remove_sorted(&queries, 0, value);
                }
            }
        }
        debug!(%query, removed, "unregistering query");
        removed
    }

    fn remove_sorted(&self, queries: &[KeyQuery], i: usize, value: &V) -> bool {
        if i >= queries.len() {
            return self.matches.write().remove(value).is_some();
        }
        let (kq, j) = fold_same_key(queries, i);
        let mut removed = false;

        if self.key.get().is_some_and(|key| key == kq.key()) {
            match &kq {
                KeyQuery::Eq(_, v) => {
                    let child = self.equal_checks.get(v).map(|e| e.value().clone());
                    if let Some(idx) = child {
                        removed |= idx.remove_sorted(queries, j, value);
                        if idx.is_empty() {
                            self.equal_checks.remove(v);
                        }
                    }
                }
                KeyQuery::Has(_) => {
                    let child = self.has_key_idx.read().clone();
                    if let Some(idx) = child {
                        removed |= idx.remove_sorted(queries, j, value);
                        if idx.is_empty() {
                            *self.has_key_idx.write() = None;
                        }
                    }
                }
                _ => {
                    let child = self.other_checks.get(&kq).map(|e| e.value().clone());
                    if let Some(idx) = child
                        && idx.remove_sorted(queries, j, value)
                    {
                        removed = true;
                        if idx.is_empty() {
                            self.other_checks.remove(&kq);
                            if self.other_checks_tree.write().remove(&kq) {
                                self.other_checks_cache.clear();
                            }
                        }
                    }

                    if kq.matches_empty() {
                        let child = self.missing_keys_idx.read().clone();
                        if let Some(idx) = child {
                            removed |= idx.remove_sorted(queries, j, value);
                            if idx.is_empty() {
                                *self.missing_keys_idx.write() = None;
                            }
                        }
                    }
                }
            }
        } else {
            let child = self.other_keys_idx.read().clone();
            if let Some(idx) = child {
                removed |= idx.remove_sorted(queries, i, value);
                if idx.is_empty() {
                    *self.other_keys_idx.write() = None;
                }
            }
        }

        removed
    }

    /// True if this index holds no values and would match no identity.
    pub fn is_empty(&self) -> bool {
        self.matches.read().is_empty()
            && self.equal_checks.iter().all(|e| e.value().is_empty())
            && self.other_checks.iter().all(|e| e.value().is_empty())
            && Self::slot_is_empty(&self.has_key_idx)
            && Self::slot_is_empty(&self.other_keys_idx)
            && Self::slot_is_empty(&self.missing_keys_idx)
    }

    fn slot_is_empty(slot: &RwLock<Option<Arc<QueryIndex<V>>>>) -> bool {
        slot.read().as_ref().is_none_or(|idx| idx.is_empty())
    }

    fn get_or_create(&self, slot: &RwLock<Option<Arc<QueryIndex<V>>>>) -> Arc<QueryIndex<V>> {
        let mut guard = slot.write();
        guard
            .get_or_insert_with(|| Self::empty(Arc::clone(&self.cache_supplier)))
            .clone()
    }

    /// All values whose queries match the identity.
    pub fn find_matches(&self, id: &Id) -> Vec<V> {
        let mut out = Vec::new();
        self.for_each_match(id, |value| out.push(value.clone()));
        out
    }

    /// Invoke the consumer for each value whose query matches the identity.
    /// A value is yielded at most once per call even when several DNF
    /// branches accept the identity.
    pub fn for_each_match(&self, id: &Id, mut consumer: impl FnMut(&V)) {
        let mut seen: HashSet<V> = HashSet::new();
        let mut dedup = |value: &V| {
            if !seen.contains(value) {
                seen.insert(value.clone());
                consumer(value);
            }
        };
        self.for_each_match_at(id, 0, &mut dedup);
    }

    fn for_each_match_at(&self, id: &Id, pos: usize, consumer: &mut dyn FnMut(&V)) {
        // Matches for this level
        let matches = self.matches.read().clone();
        for value in matches.iter() {
            consumer(value);
        }

        let Some(key) = self.key.get() else {
            return;
        };

        let mut key_present = false;
        let id_len = id.len();
        let mut j = pos;
        while j < id_len {
            let cmp = compare_keys(id.key_at(j), key);
            if cmp == Ordering::Equal {
                let value = id.value_at(j);
                let next = j + 1;
                key_present = true;

                if let Some(eq_idx) = self.equal_checks.get(value).map(|e| e.value().clone()) {
                    eq_idx.for_each_match_at(id, next, consumer);
                }

                match self.other_checks_cache.get(value) {
                    Some(cached) => {
                        for idx in &cached {
                            idx.for_each_match_at(id, next, consumer);
                        }
                    }
                    None => {
                        // Skip the list and cache allocations when there are
                        // no other checks at this level.
                        if !self.other_checks.is_empty() {
                            let applicable = self.applicable_other_checks(value, false);
                            for idx in &applicable {
                                idx.for_each_match_at(id, next, consumer);
                            }
                            self.other_checks_cache.put(value, applicable);
                        }
                    }
                }

                // The has-key subtree re-enters at the matched position, not
                // past it.
                if let Some(has_idx) = self.has_key_idx.read().clone() {
                    has_idx.for_each_match_at(id, j, consumer);
                }
            }
            // Stop once the key was found or cannot occur further on.
            if cmp != Ordering::Less {
                break;
            }
            j += 1;
        }

        if let Some(other_idx) = self.other_keys_idx.read().clone() {
            other_idx.for_each_match_at(id, pos, consumer);
        }

        if !key_present
            && let Some(missing_idx) = self.missing_keys_idx.read().clone()
        {
            missing_idx.for_each_match_at(id, pos, consumer);
        }
    }

    /// Collect the other-check children applying to a probed value, walking
    /// the prefix tree. `In` candidates are accepted as-is: the tree only
    /// surfaces them on an exact member hit.
    fn applicable_other_checks(&self, value: &str, residual_regex: bool) -> Vec<Arc<QueryIndex<V>>> {
        let mut applicable = Vec::new();
        let tree = self.other_checks_tree.read();
        tree.for_each(value, |kq| {
            let accepted = kq.is_in()
                || if residual_regex {
                    matches_after_prefix(kq, value)
                } else {
                    kq.matches(value)
                };
            if accepted && let Some(idx) = self.other_checks.get(kq) {
                applicable.push(idx.value().clone());
            }
        });
        applicable
    }

    /// All values whose queries match the given tag lookup. Use this when
    /// the tags are not already structured as an [`Id`]; the function should
    /// return `None` for absent keys.
    pub fn find_matches_with<'v>(&self, tags: impl Fn(&str) -> Option<&'v str>) -> Vec<V> {
        let mut out = Vec::new();
        self.for_each_match_with(tags, |value| out.push(value.clone()));
        out
    }

    /// Streaming, deduplicated form of [`QueryIndex::find_matches_with`].
    pub fn for_each_match_with<'v>(
        &self,
        tags: impl Fn(&str) -> Option<&'v str>,
        mut consumer: impl FnMut(&V),
    ) {
        let mut seen: HashSet<V> = HashSet::new();
        let mut dedup = |value: &V| {
            if !seen.contains(value) {
                seen.insert(value.clone());
                consumer(value);
            }
        };
        self.for_each_match_tags(&tags, &mut dedup);
    }

    fn for_each_match_tags<'v>(
        &self,
        tags: &dyn Fn(&str) -> Option<&'v str>,
        consumer: &mut dyn FnMut(&V),
    ) {
        // Matches for this level
        let matches = self.matches.read().clone();
        for value in matches.iter() {
            consumer(value);
        }

        let mut key_present = false;
        if let Some(key) = self.key.get()
            && let Some(value) = tags(key)
        {
            key_present = true;

            if let Some(eq_idx) = self.equal_checks.get(value).map(|e| e.value().clone()) {
                eq_idx.for_each_match_tags(tags, consumer);
            }

            match self.other_checks_cache.get(value) {
                Some(cached) => {
                    for idx in &cached {
                        idx.for_each_match_tags(tags, consumer);
                    }
                }
                None => {
                    if !self.other_checks.is_empty() {
                        // The prefix portion of a regex was already verified
                        // by the tree walk; only the residual runs here.
                        let applicable = self.applicable_other_checks(value, true);
                        for idx in &applicable {
                            idx.for_each_match_tags(tags, consumer);
                        }
                        self.other_checks_cache.put(value, applicable);
                    }
                }
            }

            if let Some(has_idx) = self.has_key_idx.read().clone() {
                has_idx.for_each_match_tags(tags, consumer);
            }
        }

        if let Some(other_idx) = self.other_keys_idx.read().clone() {
            other_idx.for_each_match_tags(tags, consumer);
        }

        if !key_present
            && let Some(missing_idx) = self.missing_keys_idx.read().clone()
        {
            missing_idx.for_each_match_tags(tags, consumer);
        }
    }

    /// Cheap pre-filter: true if the partial set of tags could still match
    /// some registered query once the remaining tags are provided. May
    /// over-accept; never rejects an identity `for_each_match` would yield
    /// values for.
    pub fn could_match<'v>(&self, tags: impl Fn(&str) -> Option<&'v str>) -> bool {
        self.could_match_tags(&tags)
    }

    fn could_match_tags<'v>(&self, tags: &dyn Fn(&str) -> Option<&'v str>) -> bool {
        if !self.matches.read().is_empty() {
            return true;
        }

        let mut key_present = false;
        if let Some(key) = self.key.get()
            && let Some(value) = tags(key)
        {
            key_present = true;

            if let Some(eq_idx) = self.equal_checks.get(value).map(|e| e.value().clone())
                && eq_idx.could_match_tags(tags)
            {
                return true;
            }

            if !self.other_checks.is_empty() {
                let tree = self.other_checks_tree.read();
                let hit = tree.exists(value, |kq| {
                    if kq.is_in() || could_match_value(kq, value) {
                        self.other_checks
                            .get(kq)
                            .map(|e| e.value().clone())
                            .is_some_and(|idx| idx.could_match_tags(tags))
                    } else {
                        false
                    }
                });
                if hit {
                    return true;
                }
            }

            if let Some(has_idx) = self.has_key_idx.read().clone()
                && has_idx.could_match_tags(tags)
            {
                return true;
            }
        }

        if let Some(other_idx) = self.other_keys_idx.read().clone()
            && other_idx.could_match_tags(tags)
        {
            return true;
        }

        // An absent key may still be supplied later; only a present,
        // non-matching key can rule this subtree out.
        !key_present
    }

    /// Walk the tree and report nodes whose other-checks set exceeds the
    /// threshold, e.g. a pile of regex queries on one key that will be
    /// checked linearly. The consumer receives a breadcrumb path and the
    /// predicates at the node.
    pub fn find_hot_spots(
        &self,
        threshold: usize,
        mut consumer: impl FnMut(&[String], Vec<KeyQuery>),
    ) {
        let mut path = Vec::new();
        self.find_hot_spots_at(threshold, &mut path, &mut consumer);
    }

    fn find_hot_spots_at(
        &self,
        threshold: usize,
        path: &mut Vec<String>,
        consumer: &mut dyn FnMut(&[String], Vec<KeyQuery>),
    ) {
        if let Some(key) = self.key.get() {
            path.push(format!("K={key}"));

            for entry in self.equal_checks.iter() {
                path.push(format!("{key},{},:eq", entry.key()));
                entry.value().find_hot_spots_at(threshold, path, consumer);
                path.pop();
            }

            path.push("other-checks".to_string());
            if self.other_checks.len() > threshold {
                let queries: Vec<KeyQuery> =
                    self.other_checks.iter().map(|e| e.key().clone()).collect();
                consumer(path, queries);
            }
            for entry in self.other_checks.iter() {
                path.push(entry.key().to_string());
                entry.value().find_hot_spots_at(threshold, path, consumer);
                path.pop();
            }
            path.pop();

            if let Some(has_idx) = self.has_key_idx.read().clone() {
                path.push("has".to_string());
                has_idx.find_hot_spots_at(threshold, path, consumer);
                path.pop();
            }

            path.pop();
        }

        if let Some(other_idx) = self.other_keys_idx.read().clone() {
            path.push("other-keys".to_string());
            other_idx.find_hot_spots_at(threshold, path, consumer);
            path.pop();
        }

        if let Some(missing_idx) = self.missing_keys_idx.read().clone() {
            path.push("missing-keys".to_string());
            missing_idx.find_hot_spots_at(threshold, path, consumer);
            path.pop();
        }
    }
}

impl<V> Default for QueryIndex<V>
where
    V: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Eq + Hash> fmt::Debug for QueryIndex<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIndex")
            .field("key", &self.key.get())
            .field("equal_checks", &self.equal_checks.len())
            .field("other_checks", &self.other_checks.len())
            .field("matches", &self.matches.read().len())
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Eq + Hash + fmt::Debug> fmt::Display for QueryIndex<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.build_string(f, 0)
    }
}

impl<V: Clone + Eq + Hash + fmt::Debug> QueryIndex<V> {
    fn build_string(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if let Some(key) = self.key.get() {
            indent(f, depth)?;
            writeln!(f, "key: [{key}]")?;
        }
        if !self.equal_checks.is_empty() {
            indent(f, depth)?;
            writeln!(f, "equal checks:")?;
            for entry in self.equal_checks.iter() {
                indent(f, depth)?;
                writeln!(f, "- [{}]", entry.key())?;
                entry.value().build_string(f, depth + 1)?;
            }
        }
        if !self.other_checks.is_empty() {
            indent(f, depth)?;
            writeln!(f, "other checks:")?;
            for entry in self.other_checks.iter() {
                indent(f, depth)?;
                writeln!(f, "- [{}]", entry.key())?;
                entry.value().build_string(f, depth + 1)?;
            }
        }
        if let Some(has_idx) = self.has_key_idx.read().clone() {
            indent(f, depth)?;
            writeln!(f, "has key:")?;
            has_idx.build_string(f, depth + 1)?;
        }
        if let Some(other_idx) = self.other_keys_idx.read().clone() {
            indent(f, depth)?;
            writeln!(f, "other keys:")?;
            other_idx.build_string(f, depth + 1)?;
        }
        if let Some(missing_idx) = self.missing_keys_idx.read().clone() {
            indent(f, depth)?;
            writeln!(f, "missing keys:")?;
            missing_idx.build_string(f, depth + 1)?;
        }
        let matches = self.matches.read();
        if !matches.is_empty() {
            indent(f, depth)?;
            writeln!(f, "matches:")?;
            for value in matches.iter() {
                indent(f, depth)?;
                writeln!(f, "- [{value:?}]")?;
            }
        }
        Ok(())
    }
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth * 4 {
        write!(f, " ")?;
    }
    Ok(())
}

/// Flatten a DNF clause and order it for insertion: `name` first, then the
/// remaining keys lexicographically. The sort is stable, so same-key
/// predicates keep their clause order.
fn sort_clause(clause: &Expr) -> Vec<KeyQuery> {
    let mut queries = clause.and_list();
    queries.sort_by(|a, b| compare_keys(a.key(), b.key()));
    queries
}

/// Fold a run of same-key predicates starting at `i` into one query,
/// returning it together with the index of the next distinct key. Runs of
/// length one stay as-is; longer runs become a composite.
fn fold_same_key(queries: &[KeyQuery], i: usize) -> (KeyQuery, usize) {
    let kq = &queries[i];
    let mut j = i + 1;
    while j < queries.len() && queries[j].key() == kq.key() {
        j += 1;
    }
    if j == i + 1 {
        (kq.clone(), j)
    } else {
        (
            KeyQuery::Composite(kq.key().to_string(), queries[i..j].to_vec()),
            j,
        )
    }
}

/// Match helper for the unordered-tags traversal: the prefix tree already
/// verified the literal prefix, so regexes only evaluate their residual.
fn matches_after_prefix(kq: &KeyQuery, value: &str) -> bool {
    match kq {
        KeyQuery::Re(_, pattern) => pattern.matches_after_prefix(value),
        _ => kq.matches(value),
    }
}

/// Pre-filter helper: prefix screening is sufficient evidence for a regex,
/// keeping `could_match` cheap; the full evaluation is deferred to the
/// actual matcher.
fn could_match_value(kq: &KeyQuery, value: &str) -> bool {
    match kq {
        KeyQuery::Re(_, _) => true,
        _ => kq.matches(value),
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryIndex, fold_same_key, sort_clause};
    use crate::id::Id;
    use crate::query::{Expr, KeyQuery};

    #[test]
    fn clause_sorting_puts_name_first() {
        let clause = Expr::eq("zone", "z")
            .and(Expr::eq("name", "cpu"))
            .and(Expr::eq("app", "foo"));
        let sorted = sort_clause(&clause);
        let keys: Vec<&str> = sorted.iter().map(|q| q.key()).collect();
        assert_eq!(keys, vec!["name", "app", "zone"]);
    }

    #[test]
    fn same_key_runs_fold_into_a_composite() {
        let queries = vec![
            KeyQuery::Gt("app".into(), "a".into()),
            KeyQuery::Lt("app".into(), "m".into()),
            KeyQuery::Eq("zone".into(), "z".into()),
        ];
        let (kq, next) = fold_same_key(&queries, 0);
        assert_eq!(next, 2);
        match kq {
            KeyQuery::Composite(key, members) => {
                assert_eq!(key, "app");
                assert_eq!(members.len(), 2);
            }
            other => panic!("expected composite, got {other}"),
        }

        let (kq, next) = fold_same_key(&queries, 2);
        assert_eq!(next, 3);
        assert!(kq.is_eq());
    }

    fn no_tags(_: &str) -> Option<&'static str> {
        None
    }

    #[test]
    fn empty_index_matches_nothing() {
        let idx: QueryIndex<u32> = QueryIndex::new();
        assert!(idx.is_empty());
        assert!(idx.find_matches(&Id::new("cpu")).is_empty());
        // The pre-filter stays conservative while `name` is unknown, but a
        // known name rules an empty index out.
        assert!(idx.could_match(no_tags));
        assert!(!idx.could_match(|k: &str| (k == "name").then_some("cpu")));
    }

    #[test]
    fn true_query_matches_everything() {
        let idx = QueryIndex::new();
        idx.add(&Expr::True, 1);
        assert_eq!(idx.find_matches(&Id::new("anything")), vec![1]);
        assert!(idx.could_match(no_tags));
        assert!(idx.remove(&Expr::True, &1));
        assert!(idx.is_empty());
    }

    #[test]
    fn false_query_is_ignored() {
        let idx = QueryIndex::new();
        idx.add(&Expr::False, 1);
        assert!(idx.is_empty());
        assert!(!idx.remove(&Expr::False, &1));
    }

    #[test]
    fn add_then_remove_restores_emptiness() {
        let idx = QueryIndex::new();
        let q = Expr::eq("name", "cpu").and(Expr::ne("region", "us"));
        idx.add(&q, 7);
        assert!(!idx.is_empty());
        assert!(idx.remove(&q, &7));
        assert!(idx.is_empty());
        assert!(!idx.remove(&q, &7));
    }

    #[test]
    fn display_dump_lists_the_sections() {
        let idx = QueryIndex::new();
        idx.add(&Expr::eq("name", "cpu").and(Expr::has("zone")), 1);
        let dump = idx.to_string();
        assert!(dump.contains("key: [name]"));
        assert!(dump.contains("equal checks:"));
        assert!(dump.contains("- [cpu]"));
        assert!(dump.contains("has key:"));
        assert!(dump.contains("matches:"));
    }

    #[test]
    fn debug_is_a_summary() {
        let idx: QueryIndex<u32> = QueryIndex::new();
        let dbg = format!("{idx:?}");
        assert!(dbg.contains("QueryIndex"));
        assert!(dbg.contains("key"));
    }
}
