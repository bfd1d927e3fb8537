use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::thread;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use serde_json::Value;
use tempfile::TempDir;

use opponent_cache::aggregate::{ProfileOptions, aggregate};
use opponent_cache::config::{CacheConfig, CacheVariant};
use opponent_cache::persist::{CacheSpec, CacheState, CacheStore};
use opponent_cache::query::QueryService;
use opponent_cache::record::parse_records_json;
use opponent_cache::selection::SelectionPolicy;
use opponent_cache::stats::{compute_statistics, derive_all};

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

struct Workspace {
    dir: TempDir,
    sources: Vec<PathBuf>,
}

impl Workspace {
    fn new() -> Self {
        init_logger();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sources = Vec::new();
        for name in ["tournaments_main.json", "tournaments_extra.json"] {
            let dest = dir.path().join(name);
            fs::copy(fixture_path(name), &dest).expect("copy fixture");
            age_file(&dest);
            sources.push(dest);
        }
        Self { dir, sources }
    }

    fn cache_path(&self) -> PathBuf {
        self.dir.path().join("cache").join("opponents_cache.json")
    }

    fn spec(&self) -> CacheSpec {
        CacheSpec {
            cache_path: self.cache_path(),
            sources: self.sources.clone(),
            policy: SelectionPolicy::All,
            profile: ProfileOptions::default(),
        }
    }
}

// Push mtime an hour into the past so a build right now is strictly newer.
fn age_file(path: &Path) {
    let past = SystemTime::now() - Duration::from_secs(3600);
    filetime::set_file_mtime(path, FileTime::from_system_time(past)).expect("set mtime");
}

fn touch(path: &Path) {
    thread::sleep(Duration::from_millis(20));
    filetime::set_file_mtime(path, FileTime::now()).expect("touch");
    thread::sleep(Duration::from_millis(20));
}

fn persisted_opponents(path: &Path) -> String {
    let raw = fs::read_to_string(path).expect("cache file");
    let v: Value = serde_json::from_str(&raw).expect("cache json");
    serde_json::to_string(&v["opponents"]).expect("opponents json")
}

#[test]
fn first_read_builds_and_persists() {
    let ws = Workspace::new();
    let mut store = CacheStore::open(ws.spec());
    assert_eq!(store.state(), CacheState::Empty);

    assert_eq!(store.current().opponents.len(), 6);
    assert_eq!(store.rebuild_count(), 1);
    assert_eq!(store.state(), CacheState::Fresh);
    assert!(ws.cache_path().exists());

    let raw = fs::read_to_string(ws.cache_path()).unwrap();
    let v: Value = serde_json::from_str(&raw).unwrap();
    assert!(v["last_updated"].is_string());
    assert_eq!(v["opponents"]["SMITH, JOHN"]["total_games"], 2);

    // A second instance picks the fresh file up without rebuilding.
    let mut reopened = CacheStore::open(ws.spec());
    assert_eq!(reopened.state(), CacheState::Fresh);
    assert_eq!(reopened.current().opponents.len(), 6);
    assert_eq!(reopened.rebuild_count(), 0);
}

#[test]
fn forced_refresh_is_idempotent() {
    let ws = Workspace::new();
    let mut store = CacheStore::new(ws.spec());

    assert!(store.force_refresh());
    let first = persisted_opponents(&ws.cache_path());
    let first_stamp = store.last_updated().map(str::to_string);

    assert!(store.force_refresh());
    let second = persisted_opponents(&ws.cache_path());

    assert_eq!(first, second);
    assert_eq!(store.rebuild_count(), 2);
    assert!(first_stamp.is_some());

    // Not stale, so a plain refresh does nothing.
    assert!(store.refresh());
    assert_eq!(store.rebuild_count(), 2);
    assert_eq!(persisted_opponents(&ws.cache_path()), first);
}

#[test]
fn touching_a_declared_source_triggers_one_rebuild() {
    let ws = Workspace::new();
    let mut svc = QueryService::new(CacheStore::new(ws.spec()));
    svc.statistics();
    assert_eq!(svc.store().rebuild_count(), 1);

    touch(&ws.sources[1]);
    assert_eq!(svc.state(), CacheState::Stale);

    svc.top_by_rating(3);
    assert_eq!(svc.store().rebuild_count(), 2);
    svc.search("smith");
    svc.frequent(2);
    assert_eq!(svc.store().rebuild_count(), 2);
}

#[test]
fn touching_an_undeclared_file_does_not() {
    let ws = Workspace::new();
    let stray = ws.dir.path().join("notes.json");
    fs::write(&stray, "[]").unwrap();
    age_file(&stray);

    let mut svc = QueryService::new(CacheStore::new(ws.spec()));
    svc.statistics();
    touch(&stray);
    svc.statistics();
    assert_eq!(svc.store().rebuild_count(), 1);
    assert_eq!(svc.state(), CacheState::Fresh);
}

#[test]
fn bad_sources_are_skipped() {
    let ws = Workspace::new();
    let broken = ws.dir.path().join("broken.json");
    fs::write(&broken, "{ not json").unwrap();
    let object = ws.dir.path().join("object.json");
    fs::write(&object, r#"{"name": "not a list"}"#).unwrap();
    age_file(&broken);
    age_file(&object);

    let mut spec = ws.spec();
    spec.sources = vec![
        ws.dir.path().join("missing.json"),
        broken,
        object,
        ws.sources[0].clone(),
    ];
    let mut store = CacheStore::new(spec);
    assert!(store.force_refresh());
    // Only tournaments_main.json contributed.
    assert_eq!(store.snapshot().opponents.len(), 4);
    assert_eq!(store.state(), CacheState::Fresh);
}

#[test]
fn no_sources_at_all_gives_empty_results() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut svc = QueryService::new(CacheStore::new(CacheSpec {
        cache_path: dir.path().join("c.json"),
        sources: vec![dir.path().join("nothing.json")],
        policy: SelectionPolicy::All,
        profile: ProfileOptions::default(),
    }));
    let stats = svc.statistics();
    assert_eq!(stats.total_opponents, 0);
    assert_eq!(stats.win_percentage, 0.0);
    assert!(svc.search("a").is_empty());
    assert!(svc.top_by_rating(5).is_empty());
    assert!(svc.opponent("SMITH, JOHN").is_none());
}

#[test]
fn write_failure_keeps_memory_usable() {
    let ws = Workspace::new();
    // A directory where the cache's parent should be makes the write fail.
    let blocker = ws.dir.path().join("blocked");
    fs::write(&blocker, "file, not dir").unwrap();
    let mut spec = ws.spec();
    spec.cache_path = blocker.join("cache.json");

    let mut store = CacheStore::new(spec);
    assert!(!store.force_refresh());
    assert_eq!(store.snapshot().opponents.len(), 6);
    assert!(!store.save());

    // The build timestamp is still set, so reads do not loop on rebuilds.
    let _ = store.current();
    assert_eq!(store.rebuild_count(), 1);
}

#[test]
fn persisted_statistics_match_in_memory() {
    let ws = Workspace::new();
    let mut records = Vec::new();
    for src in &ws.sources {
        records.extend(parse_records_json(&fs::read_to_string(src).unwrap()).unwrap());
    }
    let mut direct = aggregate(&records, ProfileOptions::default());
    derive_all(&mut direct);
    let expected = compute_statistics(&direct, None);

    let mut store = CacheStore::new(ws.spec());
    assert!(store.force_refresh());
    let reloaded = CacheStore::open(ws.spec());
    assert_eq!(reloaded.snapshot().opponents, direct);

    let mut svc = QueryService::new(reloaded);
    let stats = svc.statistics();
    assert_eq!(stats.total_opponents, expected.total_opponents);
    assert_eq!(stats.total_games, expected.total_games);
    assert_eq!(stats.win_percentage, expected.win_percentage);
    assert_eq!(stats.avg_opponent_rating, expected.avg_opponent_rating);
    assert_eq!(svc.store().rebuild_count(), 0);
}

#[test]
fn variants_are_independent_instances() {
    let ws = Workspace::new();
    let cfg = CacheConfig {
        data_dir: ws.dir.path().to_path_buf(),
        sources: Some(ws.sources.clone()),
        ..CacheConfig::default()
    };

    let mut all = QueryService::new(CacheStore::open(cfg.spec_for(CacheVariant::All)));
    let mut regular = QueryService::new(CacheStore::open(cfg.spec_for(CacheVariant::Regular)));
    let mut recent = CacheStore::open(cfg.spec_for(CacheVariant::Recent));

    assert_eq!(all.statistics().total_opponents, 6);
    let reg = regular.statistics();
    assert_eq!(reg.total_opponents, 5);
    assert_eq!(reg.total_games, 6);
    assert_eq!(regular.by_title("gm").len(), 1);

    assert!(ws.dir.path().join("opponents_cache.json").exists());
    assert!(ws.dir.path().join("regular_rating_cache.json").exists());

    let breakdown = recent.tournament_breakdown();
    let order: Vec<&str> = breakdown.iter().map(|t| t.tournament_name.as_str()).collect();
    assert_eq!(
        order,
        vec!["City Championship", "Summer Blitz", "Spring Open", "Winter Classic"]
    );
    assert_eq!(breakdown[0].rating_change, 25);
    assert_eq!(breakdown[0].opponents.len(), 3);
    assert_eq!(breakdown[0].opponents[0].name, "PATEL, ARJUN");
    assert_eq!(breakdown[1].rating_change, 0);
    assert!(recent.refresh());
}

#[test]
fn saving_before_any_build_writes_nothing() {
    let ws = Workspace::new();
    let mut store = CacheStore::new(ws.spec());
    assert!(!store.save());
    assert!(!ws.cache_path().exists());
    assert_eq!(store.state(), CacheState::Empty);

    let mut reopened = CacheStore::open(ws.spec());
    assert_eq!(reopened.state(), CacheState::Empty);
    assert_eq!(reopened.current().opponents.len(), 6);
    assert_eq!(reopened.rebuild_count(), 1);
}

#[test]
fn regular_breakdown_leaves_out_unrated_opponents() {
    let ws = Workspace::new();
    let cfg = CacheConfig {
        data_dir: ws.dir.path().to_path_buf(),
        sources: Some(ws.sources.clone()),
        ..CacheConfig::default()
    };
    let store = CacheStore::new(cfg.spec_for(CacheVariant::Regular));
    let breakdown = store.tournament_breakdown();

    let names: Vec<&str> = breakdown.iter().map(|t| t.tournament_name.as_str()).collect();
    assert_eq!(names, vec!["Spring Open", "Winter Classic", "City Championship"]);
    let city = &breakdown[2];
    let opponents: Vec<&str> = city.opponents.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(opponents, vec!["PATEL, ARJUN", "DOE, JANE"]);
    assert!(breakdown.iter().flat_map(|t| &t.opponents).all(|o| o.rating > 0));
}
