//! Sinks for bulk reads.
//!
//! [`Reader::get_all`](super::Reader::get_all) does not know what container
//! the caller wants. It decodes one item per live record and hands each to a
//! [`Collection`], which files it into the caller's own structure.

use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::BuildHasher;
use std::marker::PhantomData;

/// Caller-owned sink for decoded records.
///
/// `insert` is called once per record, in ascending key order. Earlier
/// items are never touched again.
pub trait Collection {
    /// Type each stored value is decoded into.
    type Item: DeserializeOwned;

    /// Receives one decoded record.
    fn insert(&mut self, key: String, item: Self::Item);
}

impl<T: DeserializeOwned> Collection for Vec<T> {
    type Item = T;

    fn insert(&mut self, _key: String, item: T) {
        self.push(item);
    }
}

impl<T: DeserializeOwned> Collection for VecDeque<T> {
    type Item = T;

    fn insert(&mut self, _key: String, item: T) {
        self.push_back(item);
    }
}

impl<T: DeserializeOwned> Collection for BTreeMap<String, T> {
    type Item = T;

    fn insert(&mut self, key: String, item: T) {
        BTreeMap::insert(self, key, item);
    }
}

impl<T: DeserializeOwned, S: BuildHasher> Collection for HashMap<String, T, S> {
    type Item = T;

    fn insert(&mut self, key: String, item: T) {
        HashMap::insert(self, key, item);
    }
}

/// Collection backed by a closure. See [`from_fn`].
pub struct FromFn<T, F> {
    f: F,
    _item: PhantomData<fn() -> T>,
}

/// Adapts a closure into a [`Collection`].
///
/// ```
/// use kvstore::kv::collection::{self, Collection};
///
/// let mut total = 0u64;
/// let mut sink = collection::from_fn(|_key: String, n: u64| total += n);
/// sink.insert("a".into(), 2);
/// sink.insert("b".into(), 3);
/// drop(sink);
/// assert_eq!(total, 5);
/// ```
pub fn from_fn<T, F>(f: F) -> FromFn<T, F>
where
    T: DeserializeOwned,
    F: FnMut(String, T),
{
    FromFn {
        f,
        _item: PhantomData,
    }
}

impl<T, F> Collection for FromFn<T, F>
where
    T: DeserializeOwned,
    F: FnMut(String, T),
{
    type Item = T;

    fn insert(&mut self, key: String, item: T) {
        (self.f)(key, item);
    }
}
