use std::env;
use std::path::{Path, PathBuf};

use crate::aggregate::ProfileOptions;
use crate::names::{DEFAULT_MAX_NAME_LEN, NameRules, RICH_MAX_NAME_LEN};
use crate::persist::CacheSpec;
use crate::selection::SelectionPolicy;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Historical tournament dumps, oldest format last.
const DEFAULT_SOURCES: &[&str] = &[
    "kiren_real_multiyear.json",
    "real_kiren_tournaments.json",
    "kiren_multiyear_tournaments.json",
    "kiren_tournaments.json",
];
/// Cleaner dumps used by the richer caches.
const CLEAN_SOURCES: &[&str] = &["real_kiren_tournaments.json", "kiren_real_multiyear.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheVariant {
    /// Every opponent from every tournament.
    All,
    /// Opponents from the most recent tournaments only, with titles.
    Recent,
    /// Rated opponents from regular time control tournaments.
    Regular,
}

impl CacheVariant {
    pub fn cache_file_name(self) -> &'static str {
        match self {
            CacheVariant::All => "opponents_cache.json",
            CacheVariant::Recent => "recent_opponents_cache.json",
            CacheVariant::Regular => "regular_rating_cache.json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub data_dir: PathBuf,
    pub cache_file: Option<PathBuf>,
    pub sources: Option<Vec<PathBuf>>,
    pub recent_limit: usize,
    pub name_max_len: Option<usize>,
    pub extract_titles: Option<bool>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cache_file: None,
            sources: None,
            recent_limit: DEFAULT_RECENT_LIMIT,
            name_max_len: None,
            extract_titles: None,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let data_dir = opt_env("OPPONENT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let cache_file = opt_env("OPPONENT_CACHE_FILE").map(PathBuf::from);
        let sources = opt_env("OPPONENT_SOURCES").map(|raw| parse_paths(&raw, &data_dir));
        let recent_limit = env::var("OPPONENT_RECENT_LIMIT")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, 200);
        let name_max_len = env::var("OPPONENT_NAME_MAX_LEN")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|v| v.clamp(20, 120));
        let extract_titles = opt_env("OPPONENT_EXTRACT_TITLES").map(|v| env_flag(&v));

        Self {
            data_dir,
            cache_file,
            sources,
            recent_limit,
            name_max_len,
            extract_titles,
        }
    }

    /// Everything a [`crate::persist::CacheStore`] for `variant` binds to.
    pub fn spec_for(&self, variant: CacheVariant) -> CacheSpec {
        let (policy, default_sources, rich, skip_unrated) = match variant {
            CacheVariant::All => (SelectionPolicy::All, DEFAULT_SOURCES, false, false),
            CacheVariant::Recent => (
                SelectionPolicy::MostRecent(self.recent_limit),
                CLEAN_SOURCES,
                true,
                false,
            ),
            CacheVariant::Regular => (SelectionPolicy::RegularTimeControl, CLEAN_SOURCES, true, true),
        };

        let cache_path = self
            .cache_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(variant.cache_file_name()));
        let sources = self.sources.clone().unwrap_or_else(|| {
            default_sources
                .iter()
                .map(|name| self.data_dir.join(name))
                .collect()
        });
        let default_len = if rich {
            RICH_MAX_NAME_LEN
        } else {
            DEFAULT_MAX_NAME_LEN
        };

        CacheSpec {
            cache_path,
            sources,
            policy,
            profile: ProfileOptions {
                names: NameRules {
                    max_len: self.name_max_len.unwrap_or(default_len),
                    extract_titles: self.extract_titles.unwrap_or(rich),
                },
                skip_unrated,
            },
        }
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

// Relative entries resolve against the data dir.
fn parse_paths(raw: &str, data_dir: &Path) -> Vec<PathBuf> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let p = PathBuf::from(s);
            if p.is_absolute() { p } else { data_dir.join(p) }
        })
        .collect()
}
