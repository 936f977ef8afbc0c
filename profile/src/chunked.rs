//! Layered per-package settings
//!
//! USE-like profile settings (use.force, package.use.mask, ...) are stored
//! as an ordered log of diffs. Each diff ([`ChunkedRecord`]) applies under a
//! scope; records for atoms are filed under the atom's `category/name` key
//! while everything else is global. Every key's list carries the global
//! records interleaved in the order they were added, so resolving a package
//! is a single left-to-right pass over one list.

use crate::incremental::{split_negations, Token, WorkingSet};
use crate::{Package, Scope};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One layer's diff under one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedRecord {
    /// Where the diff applies
    pub scope: Scope,
    /// Names turned off; `*` clears everything
    pub neg: BTreeSet<String>,
    /// Names turned on
    pub pos: BTreeSet<String>,
}

impl ChunkedRecord {
    /// Create a record
    pub fn new(scope: Scope, neg: BTreeSet<String>, pos: BTreeSet<String>) -> Self {
        Self { scope, neg, pos }
    }

    /// Create a record from incremental tokens
    pub fn from_tokens(scope: Scope, tokens: &[Token]) -> Self {
        let (neg, pos) = split_negations(tokens);
        Self::new(scope, neg, pos)
    }

    /// Whether the record resets everything before it
    pub fn clears(&self) -> bool {
        self.neg.contains("*")
    }

    /// Whether the record changes nothing
    pub fn is_empty(&self) -> bool {
        self.neg.is_empty() && self.pos.is_empty()
    }

    fn apply(&self, set: &mut WorkingSet) {
        if self.clears() {
            set.clear();
        } else {
            for name in &self.neg {
                set.remove(name);
            }
        }
        set.extend(self.pos.iter().cloned());
    }

    /// Matches every package filed under `key`
    fn is_unconditional_for(&self, key: Option<&str>) -> bool {
        match &self.scope {
            Scope::Always(value) => *value,
            Scope::Atom(atom) => atom.is_simple() && key == Some(atom.key().as_str()),
            _ => false,
        }
    }

    /// A single record equivalent to applying `self` then `next`
    fn fuse(&self, next: &ChunkedRecord) -> ChunkedRecord {
        if next.clears() {
            return ChunkedRecord::new(Scope::GLOBAL, next.neg.clone(), next.pos.clone());
        }
        let neg = self.neg.union(&next.neg).cloned().collect();
        let pos = self
            .pos
            .difference(&next.neg)
            .chain(next.pos.iter())
            .cloned()
            .collect();
        ChunkedRecord::new(Scope::GLOBAL, neg, pos)
    }
}

/// One named setting across stacked layers
#[derive(Debug, Clone, Default)]
pub struct ChunkedSettings {
    global: Vec<Arc<ChunkedRecord>>,
    by_key: IndexMap<String, Vec<Arc<ChunkedRecord>>>,
}

impl ChunkedSettings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a global-scope diff
    pub fn add_bare_global(&mut self, neg: BTreeSet<String>, pos: BTreeSet<String>) {
        self.add_global(ChunkedRecord::new(Scope::GLOBAL, neg, pos));
    }

    /// Append a record to the global log and to every known key
    pub fn add_global(&mut self, record: ChunkedRecord) {
        if record.is_empty() {
            return;
        }
        let record = Arc::new(record);
        for records in self.by_key.values_mut() {
            records.push(Arc::clone(&record));
        }
        self.global.push(record);
    }

    /// Append a record for one key, seeding the key with the global log
    pub fn add_specific(&mut self, key: impl Into<String>, record: ChunkedRecord) {
        let global = &self.global;
        self.by_key
            .entry(key.into())
            .or_insert_with(|| global.clone())
            .push(Arc::new(record));
    }

    /// File a record by its scope: atoms under their key, the rest globally
    pub fn add(&mut self, record: ChunkedRecord) {
        match record.scope.key() {
            Some(key) => self.add_specific(key, record),
            None => self.add_global(record),
        }
    }

    /// Stack `other` on top of `self`; `other` takes priority
    pub fn merge(&mut self, other: &ChunkedSettings) {
        let global = &self.global;
        for (key, records) in &other.by_key {
            self.by_key
                .entry(key.clone())
                .or_insert_with(|| global.clone())
                .extend(records.iter().cloned());
        }
        if !other.global.is_empty() {
            for (key, records) in self.by_key.iter_mut() {
                if !other.by_key.contains_key(key) {
                    records.extend(other.global.iter().cloned());
                }
            }
            self.global.extend(other.global.iter().cloned());
        }
    }

    /// Resolve the setting for a package
    pub fn pull(&self, pkg: &Package) -> WorkingSet {
        self.pull_with(pkg, &WorkingSet::new())
    }

    /// Resolve the setting for a package on top of `pre_defaults`
    pub fn pull_with(&self, pkg: &Package, pre_defaults: &WorkingSet) -> WorkingSet {
        let mut set = pre_defaults.clone();
        for record in self.records_for(&pkg.key()) {
            if record.scope.matches(pkg) {
                record.apply(&mut set);
            }
        }
        set
    }

    /// The ordered records consulted for a key
    pub fn records_for(&self, key: &str) -> impl Iterator<Item = &ChunkedRecord> {
        self.by_key
            .get(key)
            .unwrap_or(&self.global)
            .iter()
            .map(|r| r.as_ref())
    }

    /// The global log
    pub fn global_records(&self) -> impl Iterator<Item = &ChunkedRecord> {
        self.global.iter().map(|r| r.as_ref())
    }

    /// Keys with specific records
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_key.is_empty()
    }

    /// Shrink every record list without changing any [`pull`](Self::pull)
    /// result.
    ///
    /// Records before the last unconditional `-*` are dropped, empty records
    /// are dropped and runs of unconditional records are fused.
    pub fn optimize(&mut self) {
        self.global = compact(&self.global, None);
        for (key, records) in self.by_key.iter_mut() {
            *records = compact(records, Some(key.as_str()));
        }
    }
}

fn compact(records: &[Arc<ChunkedRecord>], key: Option<&str>) -> Vec<Arc<ChunkedRecord>> {
    let start = records
        .iter()
        .rposition(|r| r.clears() && r.is_unconditional_for(key))
        .unwrap_or(0);

    let mut out: Vec<Arc<ChunkedRecord>> = Vec::new();
    for record in &records[start..] {
        if record.is_empty() {
            continue;
        }
        if record.is_unconditional_for(key) {
            if let Some(last) = out.last_mut() {
                if last.is_unconditional_for(key) {
                    *last = Arc::new(last.fuse(record));
                    continue;
                }
            }
        }
        out.push(Arc::clone(record));
    }
    out
}
