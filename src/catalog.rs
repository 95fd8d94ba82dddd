//! Feature catalogs: the ordered set of feature names seen in one event stream.
//!
//! A `CatalogBuilder` is filled while a stream is read. Names keep the position they were first
//! seen at, so the same input in the same order always gives the same columns. Once the stream
//! is consumed the builder is frozen into a `FeatureCatalog`, and from then on features are
//! addressed by index.
use crate::ArcStr;
use std::{collections::BTreeMap, sync::Arc};

pub type FeatureIdx = usize;

/// Append-only, de-duplicating list of feature names.
#[derive(Debug, Default, Clone)]
pub struct CatalogBuilder {
    names: Vec<ArcStr>,
    name_idx: BTreeMap<ArcStr, FeatureIdx>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the index for `name`, adding it at the end if it is new.
    pub fn intern(&mut self, name: &str) -> FeatureIdx {
        if let Some(idx) = self.name_idx.get(name) {
            return *idx;
        }
        let idx = self.names.len();
        let name: ArcStr = name.into();
        self.names.push(name.clone());
        self.name_idx.insert(name, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn freeze(self) -> FeatureCatalog {
        FeatureCatalog {
            names: self.names.into(),
        }
    }
}

/// The frozen feature universe of one stream.
#[derive(Debug, Default, Clone)]
pub struct FeatureCatalog {
    names: Arc<[ArcStr]>,
}

impl FeatureCatalog {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in discovery order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(|name| &**name)
    }
}

impl<S: AsRef<str>> FromIterator<S> for FeatureCatalog {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = S>,
    {
        let mut builder = CatalogBuilder::new();
        for name in iter {
            builder.intern(name.as_ref());
        }
        builder.freeze()
    }
}
