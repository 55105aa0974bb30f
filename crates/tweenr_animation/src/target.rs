//! Animation targets
//!
//! A timeline writes interpolated values onto any object whose numeric
//! properties can be read and assigned by name.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Ordered mapping of property name to value
pub type PropertyMap = IndexMap<String, f32>;

/// An object whose numeric properties can be driven by a timeline
pub trait Animatable {
    /// Read a property, `None` if the object has no such property
    fn property(&self, name: &str) -> Option<f32>;

    /// Assign a property
    fn set_property(&mut self, name: &str, value: f32);
}

/// A loose bag of named numeric properties
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyBag {
    values: FxHashMap<String, f32>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a property
    pub fn with(mut self, name: impl Into<String>, value: f32) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all properties (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Animatable for PropertyBag {
    fn property(&self, name: &str) -> Option<f32> {
        self.get(name)
    }

    fn set_property(&mut self, name: &str, value: f32) {
        // Avoid reallocating the key on every tick
        match self.values.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f32)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, f32)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
