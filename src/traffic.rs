use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, info};

use crate::{catalog::EmoteCatalog, events::Candidate};

/// Well-known names tried when seeding the pool, grouped by provider.
pub const TEST_EMOTES: [(&str, [&str; 3]); 4] = [
    ("7tv", ["peepoHappy", "EZ", "PartyParrot"]),
    ("bttv", ["FeelsBadMan", "bttvNice", ":tf:"]),
    ("ffz", ["ZreknarF", "LaterSooner", "BeanieHipster"]),
    ("twitch", ["4Head", "Kappa", "SMOrc"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOrigin {
    Standard,
    Collected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub name: String,
    pub image_url: String,
    pub origin: PoolOrigin,
}

/// Synthetic candidate source for exercising the wall without live chat.
#[derive(Debug, Default)]
pub struct TestTrafficGenerator {
    pool: Vec<PoolEntry>,
    names: HashSet<String>,
    running: bool,
}

impl TestTrafficGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pool(&self) -> &[PoolEntry] {
        &self.pool
    }

    /// Resets the pool to the seed names the catalog can resolve.
    pub fn init_pool(&mut self, catalog: &EmoteCatalog) -> usize {
        self.pool.clear();
        self.names.clear();
        for name in TEST_EMOTES.iter().flat_map(|(_, names)| names.iter()) {
            if let Some(url) = catalog.resolve(name) {
                self.push(name, url, PoolOrigin::Standard);
            }
        }
        info!(size = self.pool.len(), "test pool initialized");
        self.pool.len()
    }

    /// Adds a name seen in live chat. Returns false when it is already pooled
    /// or has no image.
    pub fn collect(&mut self, name: &str, image_url: Option<&str>, catalog: &EmoteCatalog) -> bool {
        if self.names.contains(name) {
            return false;
        }
        let Some(url) = image_url.or_else(|| catalog.resolve(name)) else {
            return false;
        };
        self.push(name, url, PoolOrigin::Collected);
        debug!(name, size = self.pool.len(), "collected emote into test pool");
        true
    }

    pub fn forget(&mut self, name: &str) -> bool {
        if !self.names.remove(name) {
            return false;
        }
        self.pool.retain(|entry| entry.name != name);
        true
    }

    /// Seeds an empty pool before starting. Returns false if already running.
    pub fn start(&mut self, catalog: &EmoteCatalog) -> bool {
        if self.running {
            return false;
        }
        if self.pool.is_empty() {
            self.init_pool(catalog);
        }
        self.running = true;
        info!(size = self.pool.len(), "test mode started");
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        info!("test mode stopped");
        true
    }

    /// A uniformly random pool entry as a test candidate.
    pub fn tick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Candidate> {
        if !self.running || self.pool.is_empty() {
            return None;
        }
        let entry = &self.pool[rng.gen_range(0..self.pool.len())];
        Some(Candidate::test(&entry.name, &entry.image_url))
    }

    fn push(&mut self, name: &str, image_url: &str, origin: PoolOrigin) {
        if self.names.insert(name.to_owned()) {
            self.pool.push(PoolEntry {
                name: name.to_owned(),
                image_url: image_url.to_owned(),
                origin,
            });
        }
    }
}
