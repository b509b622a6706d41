use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

pub(crate) const NAME_KEY: &str = "name";

/// Compare tag keys so that `name` sorts first and the remaining keys sort
/// lexicographically. Insertion and traversal both rely on this ordering; an
/// identity is always walked in the same order its predicates were indexed.
pub(crate) fn compare_keys(k1: &str, k2: &str) -> Ordering {
    match (k1 == NAME_KEY, k2 == NAME_KEY) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => k1.cmp(k2),
    }
}

type Tag = (String, String);

/// Identity of a measurement: a `name` plus a set of key/value tags.
///
/// Tags are stored with the `name` pair first and the remaining keys unique
/// and in lexicographic order, so the index can walk an identity with a
/// monotone cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    tags: SmallVec<[Tag; 8]>,
}

impl Id {
    pub fn new(name: impl Into<String>) -> Self {
        let mut tags = SmallVec::new();
        tags.push((NAME_KEY.to_string(), name.into()));
        Self { tags }
    }

    /// Add a tag, keeping the sort order. Setting an existing key (including
    /// `name`) replaces its value.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == NAME_KEY {
            self.tags[0].1 = value;
            return self;
        }
        match self.tags[1..].binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(i) => self.tags[i + 1].1 = value,
            Err(i) => self.tags.insert(i + 1, (key, value)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.tags[0].1
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn key_at(&self, i: usize) -> &str {
        &self.tags[i].0
    }

    pub fn value_at(&self, i: usize) -> &str {
        &self.tags[i].1
    }

    /// Value for a tag key, or `None` when the key is absent.
    pub fn tag(&self, key: &str) -> Option<&str> {
        if key == NAME_KEY {
            return Some(self.name());
        }
        self.tags[1..]
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| self.tags[i + 1].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for (k, v) in self.iter().skip(1) {
            write!(f, ",{k}={v}")?;
        }
        Ok(())
    }
}
