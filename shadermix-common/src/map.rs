/// Fast hash map type for small, string-keyed tables.
pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Fast hash set type.
pub type FastHashSet<T> = rustc_hash::FxHashSet<T>;
