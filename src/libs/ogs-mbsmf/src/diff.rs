//! Structural Diff Engine
//!
//! Computes the ordered list of [`PatchOp`]s turning one snapshot of a model
//! value into another. The walk is driven by the [`Diff`] implementations of
//! the model types: composites visit their fields in declaration order,
//! lists are compared positionally and integer keyed maps by key.
//!
//! The output order is part of the wire contract and depends only on the
//! shape of the inputs.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::encode::{BitRate, FsaId, Nid, NrCellId, ReservPriority, Tac, ToDocument};
use crate::patch::{format_pointer, PatchOp, APPEND};

/// Values the diff engine can walk
pub trait Diff: ToDocument {
    /// Append to `patch` the operations turning `self` into `new`, both
    /// present, at the patch's current path.
    fn diff_to(&self, new: &Self, patch: &mut Patch);
}

/// Diff two optional snapshots
pub fn diff<T: Diff + ?Sized>(old: Option<&T>, new: Option<&T>) -> Vec<PatchOp> {
    let mut patch = Patch::new();
    patch.presence(old, new);
    patch.into_ops()
}

/// Diff two present snapshots
pub fn diff_values<T: Diff + ?Sized>(old: &T, new: &T) -> Vec<PatchOp> {
    diff(Some(old), Some(new))
}

/// Operation accumulator with a cursor into the document tree
#[derive(Debug, Default)]
pub struct Patch {
    path: Vec<String>,
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<PatchOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Current pointer
    pub fn pointer(&self) -> String {
        format_pointer(&self.path)
    }

    fn pointer_with(&self, last: &str) -> String {
        let mut segments: Vec<&str> = self.path.iter().map(String::as_str).collect();
        segments.push(last);
        format_pointer(&segments)
    }

    /// Run `f` one level deeper, under `segment`
    pub fn nested<F>(&mut self, segment: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.path.push(segment.into());
        f(self);
        self.path.pop();
    }

    /// `add` at the current path
    pub fn add<T: ToDocument + ?Sized>(&mut self, value: &T) {
        let op = PatchOp::add(self.pointer(), value.to_document());
        self.ops.push(op);
    }

    /// `replace` at the current path
    pub fn replace<T: ToDocument + ?Sized>(&mut self, value: &T) {
        let op = PatchOp::replace(self.pointer(), value.to_document());
        self.ops.push(op);
    }

    /// `remove` at the current path
    pub fn remove(&mut self) {
        let op = PatchOp::remove(self.pointer());
        self.ops.push(op);
    }

    /// Diff two present values at the current path
    pub fn value<T: Diff + ?Sized>(&mut self, old: &T, new: &T) {
        if std::ptr::eq(old, new) {
            return;
        }
        old.diff_to(new, self);
    }

    /// Diff two optional values at the current path
    pub fn presence<T: Diff + ?Sized>(&mut self, old: Option<&T>, new: Option<&T>) {
        match (old, new) {
            (None, None) => {}
            (None, Some(new)) => self.add(new),
            (Some(_), None) => self.remove(),
            (Some(old), Some(new)) => self.value(old, new),
        }
    }

    /// Scalar comparison: one `replace` when the values differ
    pub fn scalar<T: PartialEq + ToDocument + ?Sized>(&mut self, old: &T, new: &T) {
        if old != new {
            self.replace(new);
        }
    }

    /// Diff the member `name` of a composite
    pub fn field<T: Diff + ?Sized>(&mut self, name: &str, old: &T, new: &T) {
        self.nested(name, |patch| patch.value(old, new));
    }

    /// Boolean member that is only present on the wire when set
    pub fn flag(&mut self, name: &str, old: bool, new: bool) {
        match (old, new) {
            (false, true) => self.nested(name, |patch| patch.add(&true)),
            (true, false) => self.nested(name, |patch| patch.remove()),
            _ => {}
        }
    }

    /// List member that is only present on the wire when non-empty
    pub fn sequence<T>(&mut self, name: &str, old: &[T], new: &[T])
    where
        T: Diff + PartialEq + Serialize,
    {
        match (old.is_empty(), new.is_empty()) {
            (true, true) => {}
            (true, false) => self.nested(name, |patch| patch.add(new)),
            (false, true) => self.nested(name, |patch| patch.remove()),
            (false, false) => self.nested(name, |patch| patch.list(old, new)),
        }
    }

    /// Positional list diff at the current path
    ///
    /// Paired entries are diffed under their index. Entries only in `new`
    /// are appended with `/-`. Entries dropped from `old` are removed at the
    /// running cursor, which does not advance since later entries shift
    /// left. While `old` has more entries left than `new`, an `old` entry
    /// that does not reappear in the rest of `new` is taken as dropped
    /// rather than paired.
    pub fn list<T>(&mut self, old: &[T], new: &[T])
    where
        T: Diff + PartialEq,
    {
        let (mut i, mut j) = (0usize, 0usize);
        let mut cursor = 0usize;

        while i < old.len() && j < new.len() {
            let dropped = old.len() - i > new.len() - j && !new[j..].contains(&old[i]);
            if dropped {
                self.ops.push(PatchOp::remove(self.pointer_with(&cursor.to_string())));
                i += 1;
                continue;
            }
            self.nested(cursor.to_string(), |patch| patch.value(&old[i], &new[j]));
            i += 1;
            j += 1;
            cursor += 1;
        }

        for entry in &new[j..] {
            self.ops.push(PatchOp::add(self.pointer_with(APPEND), entry.to_document()));
        }

        for _ in &old[i..] {
            self.ops.push(PatchOp::remove(self.pointer_with(&cursor.to_string())));
        }
    }

    /// Keyed map diff at the current path, in ascending key order
    pub fn map<K, T>(&mut self, old: &BTreeMap<K, T>, new: &BTreeMap<K, T>)
    where
        K: Ord + Display,
        T: Diff,
    {
        let mut keys: Vec<&K> = old.keys().chain(new.keys()).collect();
        keys.sort();
        keys.dedup();

        for key in keys {
            let segment = key.to_string();
            match (old.get(key), new.get(key)) {
                (Some(_), None) => self.nested(segment, |patch| patch.remove()),
                (None, Some(entry)) => self.nested(segment, |patch| patch.add(entry)),
                (Some(a), Some(b)) => self.nested(segment, |patch| patch.value(a, b)),
                (None, None) => {}
            }
        }
    }
}

/// Implement [`Diff`] as a single `replace` on inequality
#[macro_export]
macro_rules! scalar_diff {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::diff::Diff for $ty {
                fn diff_to(&self, new: &Self, patch: &mut $crate::diff::Patch) {
                    patch.scalar(self, new);
                }
            }
        )*
    };
}

scalar_diff!(bool, u8, u16, u32, u64, i32, i64, f32, f64, String, DateTime<Utc>);
scalar_diff!(BitRate, FsaId, Nid, NrCellId, ReservPriority, Tac);

impl Diff for str {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.scalar(self, new);
    }
}

impl<T: Diff + Serialize> Diff for Option<T> {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.presence(self.as_ref(), new.as_ref());
    }
}

impl<T: Diff + PartialEq + Serialize> Diff for Vec<T> {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.list(self, new);
    }
}

impl<T: Diff + PartialEq + Serialize> Diff for [T] {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.list(self, new);
    }
}

impl<K, T> Diff for BTreeMap<K, T>
where
    K: Ord + Display + Serialize,
    T: Diff + Serialize,
{
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.map(self, new);
    }
}
