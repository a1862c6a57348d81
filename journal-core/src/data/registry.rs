//! Named adapter table the resolver looks chain steps up in.

use super::source::{DisabledSource, PointSource, SeriesSource};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Adapters by registry name. A name may carry a point adapter, a series
/// adapter, or both.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    points: BTreeMap<String, Arc<dyn PointSource>>,
    series: BTreeMap<String, Arc<dyn SeriesSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every name answered by a [`DisabledSource`]. Offline runs resolve
    /// through carry-forward only.
    pub fn disabled<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut reg = Self::new();
        for name in names {
            reg.register(Arc::new(DisabledSource::new(name)));
        }
        reg
    }

    pub fn register_point(&mut self, source: Arc<dyn PointSource>) -> &mut Self {
        self.points.insert(source.name().to_string(), source);
        self
    }

    pub fn register_series(&mut self, source: Arc<dyn SeriesSource>) -> &mut Self {
        self.series.insert(source.name().to_string(), source);
        self
    }

    /// Register an adapter that answers both lookup kinds.
    pub fn register<T>(&mut self, source: Arc<T>) -> &mut Self
    where
        T: PointSource + SeriesSource + 'static,
    {
        let name = PointSource::name(source.as_ref()).to_string();
        self.points.insert(name.clone(), source.clone());
        self.series.insert(name, source);
        self
    }

    pub fn point(&self, name: &str) -> Option<&Arc<dyn PointSource>> {
        self.points.get(name)
    }

    pub fn series(&self, name: &str) -> Option<&Arc<dyn SeriesSource>> {
        self.series.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.points.contains_key(name) || self.series.contains_key(name)
    }

    /// All registered names, sorted and deduplicated.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .points
            .keys()
            .chain(self.series.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("points", &self.points.keys().collect::<Vec<_>>())
            .field("series", &self.series.keys().collect::<Vec<_>>())
            .finish()
    }
}
