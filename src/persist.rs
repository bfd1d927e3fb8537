use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregator, OpponentProfile, ProfileOptions};
use crate::error::SourceError;
use crate::record::{TournamentRecord, parse_records_json};
use crate::selection::SelectionPolicy;
use crate::stats;

const CACHE_VERSION: u32 = 1;
/// Caches written before the `version` field existed.
const LEGACY_VERSION: u32 = 0;

/// What one cache instance is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSpec {
    pub cache_path: PathBuf,
    /// Checked in order for staleness and read in order on rebuild.
    pub sources: Vec<PathBuf>,
    pub policy: SelectionPolicy,
    pub profile: ProfileOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    /// RFC 3339 build time; `None` until the first build or load.
    pub last_updated: Option<String>,
    pub opponents: BTreeMap<String, OpponentProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

#[derive(Serialize)]
struct CacheFileOut<'a> {
    version: u32,
    last_updated: Option<&'a str>,
    opponents: &'a BTreeMap<String, OpponentProfile>,
}

#[derive(Deserialize)]
struct CacheFileIn {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    opponents: BTreeMap<String, OpponentProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownOpponent {
    pub name: String,
    pub title: Option<String>,
    pub rating: i64,
    pub result: String,
    pub round: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentBreakdown {
    pub tournament_name: String,
    pub date: String,
    pub score: String,
    pub rating_change: i64,
    pub opponents: Vec<BreakdownOpponent>,
}

/// Owns one on-disk opponent cache and its in-memory snapshot.
///
/// Every rebuild starts from an empty snapshot and re-reads all sources;
/// nothing is merged into a previous build.
#[derive(Debug)]
pub struct CacheStore {
    spec: CacheSpec,
    snapshot: CacheSnapshot,
    rebuilds: u64,
}

impl CacheStore {
    /// A store with an empty snapshot; touches no files.
    pub fn new(spec: CacheSpec) -> Self {
        Self {
            spec,
            snapshot: CacheSnapshot::default(),
            rebuilds: 0,
        }
    }

    /// [`CacheStore::new`] followed by [`CacheStore::load`].
    pub fn open(spec: CacheSpec) -> Self {
        let mut store = Self::new(spec);
        store.load();
        store
    }

    pub fn spec(&self) -> &CacheSpec {
        &self.spec
    }

    /// The in-memory snapshot as is, without a staleness check.
    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.snapshot.last_updated.as_deref()
    }

    /// Number of rebuilds this instance has run.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn state(&self) -> CacheState {
        if self.snapshot.last_updated.is_none() {
            CacheState::Empty
        } else if self.needs_refresh() {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    /// Replace the in-memory snapshot with the persisted one.
    /// On any failure the snapshot is left empty and `false` is returned.
    pub fn load(&mut self) -> bool {
        self.snapshot = CacheSnapshot::default();
        let path = &self.spec.cache_path;
        if !path.exists() {
            log::debug!("no opponent cache at {}", path.display());
            return false;
        }
        match read_snapshot(path) {
            Ok(Some(snapshot)) => {
                log::info!(
                    "loaded {} opponents from {}",
                    snapshot.opponents.len(),
                    path.display()
                );
                self.snapshot = snapshot;
                true
            }
            Ok(None) => {
                log::warn!("ignoring {}: cache version mismatch", path.display());
                false
            }
            Err(err) => {
                log::warn!("could not load opponent cache: {err:#}");
                false
            }
        }
    }

    /// Persist the current snapshot. Failures are logged and reported as `false`;
    /// the in-memory snapshot stays usable either way. Nothing is written
    /// before the first build or load, so an empty store stays Empty on disk.
    pub fn save(&mut self) -> bool {
        if self.snapshot.last_updated.is_none() {
            log::warn!(
                "not saving {}: cache has never been built",
                self.spec.cache_path.display()
            );
            return false;
        }
        match write_snapshot(&self.spec.cache_path, &self.snapshot) {
            Ok(()) => {
                log::info!(
                    "saved {} opponents to {}",
                    self.snapshot.opponents.len(),
                    self.spec.cache_path.display()
                );
                true
            }
            Err(err) => {
                log::warn!("could not save opponent cache: {err:#}");
                false
            }
        }
    }

    /// True when there is no build timestamp or any existing source was
    /// modified after it. Missing sources never make the cache stale.
    pub fn needs_refresh(&self) -> bool {
        let Some(raw) = self.snapshot.last_updated.as_deref() else {
            return true;
        };
        let Some(built_at) = parse_timestamp(raw) else {
            log::warn!("unreadable cache timestamp {raw:?}");
            return true;
        };
        for source in &self.spec.sources {
            let Some(modified) = modified_at(source) else {
                continue;
            };
            if modified > built_at {
                log::info!("source {} is newer than cache", source.display());
                return true;
            }
        }
        false
    }

    /// Rebuild only if stale. Returns whether the snapshot is fresh and persisted.
    pub fn refresh(&mut self) -> bool {
        if !self.needs_refresh() {
            return true;
        }
        self.rebuild()
    }

    /// Rebuild regardless of timestamps.
    pub fn force_refresh(&mut self) -> bool {
        log::info!("force refreshing {}", self.spec.cache_path.display());
        self.rebuild()
    }

    /// Refresh-then-serve access used by every read path.
    pub fn current(&mut self) -> &CacheSnapshot {
        if self.needs_refresh() {
            self.rebuild();
        }
        &self.snapshot
    }

    /// Per-tournament view of the selected records with cleaned opponent names.
    pub fn tournament_breakdown(&self) -> Vec<TournamentBreakdown> {
        let records = self.spec.policy.apply(&self.load_sources());
        records
            .iter()
            .map(|record| TournamentBreakdown {
                tournament_name: record.name.clone(),
                date: record.date.clone(),
                score: record.score.clone(),
                rating_change: record.rating_change(),
                opponents: record
                    .opponents
                    .iter()
                    .filter(|enc| !(self.spec.profile.skip_unrated && enc.rating == 0))
                    .filter_map(|enc| {
                        let (name, title) = self.spec.profile.names.canonicalize(&enc.name)?;
                        Some(BreakdownOpponent {
                            name,
                            title,
                            rating: enc.rating,
                            result: enc.result.clone(),
                            round: enc.round,
                        })
                    })
                    .collect(),
            })
            .collect()
    }

    fn rebuild(&mut self) -> bool {
        // Stamp with the start time so a source written mid-build marks the result stale.
        let started = Utc::now();
        log::info!(
            "rebuilding {} from {}",
            self.spec.cache_path.display(),
            self.spec.policy.describe()
        );
        self.snapshot = CacheSnapshot::default();

        let records = self.load_sources();
        if records.is_empty() {
            log::warn!("no tournament records found in any declared source");
        }
        let selected = self.spec.policy.apply(&records);

        let mut agg = Aggregator::new(self.spec.profile);
        agg.ingest_all(&selected);
        let counts = agg.counts();
        let mut opponents = agg.finish();
        stats::derive_all(&mut opponents);

        log::info!(
            "aggregated {} encounters from {} tournaments into {} opponents ({} names rejected, {} unrated skipped, {} unknown results)",
            counts.encounters,
            counts.records,
            opponents.len(),
            counts.rejected_names,
            counts.skipped_unrated,
            counts.ignored_results
        );

        self.snapshot = CacheSnapshot {
            last_updated: Some(format_timestamp(started)),
            opponents,
        };
        self.rebuilds += 1;
        self.save()
    }

    fn load_sources(&self) -> Vec<TournamentRecord> {
        let mut all = Vec::new();
        for source in &self.spec.sources {
            match load_source_file(source) {
                Ok(records) => {
                    log::info!("loaded {} tournaments from {}", records.len(), source.display());
                    all.extend(records);
                }
                Err(err) if err.is_missing() => log::debug!("{err}"),
                Err(err) => log::warn!("skipping {}: {err}", source.display()),
            }
        }
        all
    }
}

pub fn load_source_file(path: &Path) -> Result<Vec<TournamentRecord>, SourceError> {
    if !path.exists() {
        return Err(SourceError::Missing(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|err| SourceError::Unreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    parse_records_json(&raw)
}

fn read_snapshot(path: &Path) -> Result<Option<CacheSnapshot>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read opponent cache {}", path.display()))?;
    let file: CacheFileIn = serde_json::from_str(&raw).context("parse opponent cache")?;
    if file.version != CACHE_VERSION && file.version != LEGACY_VERSION {
        return Ok(None);
    }
    Ok(Some(CacheSnapshot {
        last_updated: file.last_updated,
        opponents: file.opponents,
    }))
}

fn write_snapshot(path: &Path, snapshot: &CacheSnapshot) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let out = CacheFileOut {
        version: CACHE_VERSION,
        last_updated: snapshot.last_updated.as_deref(),
        opponents: &snapshot.opponents,
    };
    let json = serde_json::to_string_pretty(&out).context("serialize opponent cache")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).context("write opponent cache")?;
    fs::rename(&tmp, path).context("swap opponent cache")?;
    Ok(())
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC 3339, or a zone-less ISO timestamp taken as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}
