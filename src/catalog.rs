use std::collections::HashMap;

/// Emote providers, declared in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogSource {
    /// 7TV emote set of the watched channel.
    Channel,
    /// 7TV global emote set.
    Global,
    /// BetterTTV, global plus channel.
    Bttv,
    /// FrankerFaceZ room sets.
    Ffz,
}

impl CatalogSource {
    pub const PRIORITY: [CatalogSource; 4] = [
        CatalogSource::Channel,
        CatalogSource::Global,
        CatalogSource::Bttv,
        CatalogSource::Ffz,
    ];

    fn slot(self) -> usize {
        match self {
            CatalogSource::Channel => 0,
            CatalogSource::Global => 1,
            CatalogSource::Bttv => 2,
            CatalogSource::Ffz => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteRef {
    pub name: String,
    pub image_url: String,
    pub source: CatalogSource,
}

/// Merged name -> image index over all providers.
///
/// A name may be registered by several providers; [`EmoteCatalog::resolve`]
/// always answers from the highest-priority one.
#[derive(Debug, Clone, Default)]
pub struct EmoteCatalog {
    tables: [HashMap<String, EmoteRef>; 4],
}

impl EmoteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        source: CatalogSource,
        name: impl Into<String>,
        image_url: impl Into<String>,
    ) {
        let name = name.into();
        let entry = EmoteRef {
            name: name.clone(),
            image_url: image_url.into(),
            source,
        };
        self.tables[source.slot()].insert(name, entry);
    }

    pub fn extend(
        &mut self,
        source: CatalogSource,
        entries: impl IntoIterator<Item = (String, String)>,
    ) -> usize {
        let mut added = 0;
        for (name, url) in entries {
            self.register(source, name, url);
            added += 1;
        }
        added
    }

    pub fn resolve_ref(&self, name: &str) -> Option<&EmoteRef> {
        CatalogSource::PRIORITY
            .iter()
            .find_map(|source| self.tables[source.slot()].get(name))
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.resolve_ref(name).map(|entry| entry.image_url.as_str())
    }

    /// Drops `name` from every provider table. Returns whether anything was removed.
    pub fn purge(&mut self, name: &str) -> bool {
        let mut removed = false;
        for table in &mut self.tables {
            removed |= table.remove(name).is_some();
        }
        removed
    }

    pub fn source_len(&self, source: CatalogSource) -> usize {
        self.tables[source.slot()].len()
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(HashMap::is_empty)
    }
}
