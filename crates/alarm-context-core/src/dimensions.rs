use std::collections::BTreeMap;

use crate::model::Dimension;

/// A named combination of dimensions a handler knows how to enrich.
#[derive(Debug, Clone, Copy)]
pub struct Shape<K> {
    pub kind: K,
    pub required: &'static [&'static str],
}

impl<K> Shape<K> {
    pub const fn new(kind: K, required: &'static [&'static str]) -> Self {
        Self { kind, required }
    }
}

/// Alarm dimensions indexed by name.
///
/// Shapes are matched on which names are present, never on the order the
/// alarm lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionSet {
    values: BTreeMap<String, String>,
}

impl DimensionSet {
    pub fn new(dimensions: &[Dimension]) -> Self {
        let values = dimensions
            .iter()
            .map(|d| (d.name.clone(), d.value.clone()))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The value of a dimension the classified shape guarantees is present.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn contains_all(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.contains(name))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// First shape, in table order, whose required names are all present.
    pub fn classify<K: Copy>(&self, shapes: &[Shape<K>]) -> Option<K> {
        shapes
            .iter()
            .find(|shape| self.contains_all(shape.required))
            .map(|shape| shape.kind)
    }
}
