//! Read side of the opponent cache.
//!
//! The free functions are pure and work on any opponent map. [`QueryService`]
//! wraps a [`CacheStore`] and rebuilds it first when a source is newer.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::aggregate::OpponentProfile;
use crate::persist::{CacheState, CacheStore};
use crate::stats::{CacheStatistics, compute_statistics};

type Opponents = BTreeMap<String, OpponentProfile>;

// Highest average first; equal ratings fall back to canonical name.
fn by_rating_desc(a: &OpponentProfile, b: &OpponentProfile) -> Ordering {
    b.avg_rating
        .total_cmp(&a.avg_rating)
        .then_with(|| a.name.cmp(&b.name))
}

fn by_games_desc(a: &OpponentProfile, b: &OpponentProfile) -> Ordering {
    b.total_games
        .cmp(&a.total_games)
        .then_with(|| a.name.cmp(&b.name))
}

/// Case-insensitive substring match; an exact name match ranks first.
pub fn search<'a>(opponents: &'a Opponents, term: &str) -> Vec<&'a OpponentProfile> {
    let needle = term.trim().to_uppercase();
    let mut hits: Vec<(bool, &OpponentProfile)> = opponents
        .values()
        .filter_map(|p| {
            let hay = p.name.to_uppercase();
            hay.contains(&needle).then_some((hay == needle, p))
        })
        .collect();
    hits.sort_by(|(exact_a, a), (exact_b, b)| exact_b.cmp(exact_a).then_with(|| by_rating_desc(a, b)));
    hits.into_iter().map(|(_, p)| p).collect()
}

/// Inclusive on both ends.
pub fn by_rating_range(opponents: &Opponents, min: f64, max: f64) -> Vec<&OpponentProfile> {
    let mut out: Vec<&OpponentProfile> = opponents
        .values()
        .filter(|p| min <= p.avg_rating && p.avg_rating <= max)
        .collect();
    out.sort_by(|a, b| by_rating_desc(a, b));
    out
}

pub fn frequent(opponents: &Opponents, min_games: u32) -> Vec<&OpponentProfile> {
    let mut out: Vec<&OpponentProfile> = opponents
        .values()
        .filter(|p| p.total_games >= min_games)
        .collect();
    out.sort_by(|a, b| by_games_desc(a, b));
    out
}

pub fn top_by_rating(opponents: &Opponents, limit: usize) -> Vec<&OpponentProfile> {
    let mut out: Vec<&OpponentProfile> = opponents.values().collect();
    out.sort_by(|a, b| by_rating_desc(a, b));
    out.truncate(limit);
    out
}

/// Opponents met more than once.
pub fn most_played(opponents: &Opponents, limit: usize) -> Vec<&OpponentProfile> {
    let mut out = frequent(opponents, 2);
    out.truncate(limit);
    out
}

pub fn by_title<'a>(opponents: &'a Opponents, title: &str) -> Vec<&'a OpponentProfile> {
    let wanted = title.trim();
    let mut out: Vec<&OpponentProfile> = opponents
        .values()
        .filter(|p| p.title.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(wanted)))
        .collect();
    out.sort_by(|a, b| by_rating_desc(a, b));
    out
}

/// Opponents the subject beat at least once while rated below them.
pub fn upset_victories(opponents: &Opponents) -> Vec<&OpponentProfile> {
    let mut out: Vec<&OpponentProfile> = opponents
        .values()
        .filter(|p| p.upset_victories > 0)
        .collect();
    out.sort_by(|a, b| by_rating_desc(a, b));
    out
}

/// Read-only queries over one cache, each preceded by a staleness check.
#[derive(Debug)]
pub struct QueryService {
    store: CacheStore,
}

impl QueryService {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CacheStore {
        &mut self.store
    }

    pub fn into_store(self) -> CacheStore {
        self.store
    }

    pub fn state(&self) -> CacheState {
        self.store.state()
    }

    pub fn all(&mut self) -> &Opponents {
        &self.store.current().opponents
    }

    pub fn opponent(&mut self, name: &str) -> Option<&OpponentProfile> {
        self.store.current().opponents.get(name)
    }

    pub fn search(&mut self, term: &str) -> Vec<&OpponentProfile> {
        search(&self.store.current().opponents, term)
    }

    pub fn by_rating_range(&mut self, min: f64, max: f64) -> Vec<&OpponentProfile> {
        by_rating_range(&self.store.current().opponents, min, max)
    }

    pub fn frequent(&mut self, min_games: u32) -> Vec<&OpponentProfile> {
        frequent(&self.store.current().opponents, min_games)
    }

    pub fn top_by_rating(&mut self, limit: usize) -> Vec<&OpponentProfile> {
        top_by_rating(&self.store.current().opponents, limit)
    }

    pub fn most_played(&mut self, limit: usize) -> Vec<&OpponentProfile> {
        most_played(&self.store.current().opponents, limit)
    }

    pub fn by_title(&mut self, title: &str) -> Vec<&OpponentProfile> {
        by_title(&self.store.current().opponents, title)
    }

    pub fn upset_victories(&mut self) -> Vec<&OpponentProfile> {
        upset_victories(&self.store.current().opponents)
    }

    pub fn statistics(&mut self) -> CacheStatistics {
        let snapshot = self.store.current();
        compute_statistics(&snapshot.opponents, snapshot.last_updated.as_deref())
    }
}
