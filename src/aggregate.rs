use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::names::{NameRules, better_title};
use crate::record::{EncounterResult, RawEncounter, TournamentRecord};

/// Everything known about one opponent, keyed by canonical name.
///
/// The `Vec` fields are parallel: index `i` of each describes the same
/// encounter, in ingestion order (not necessarily calendar order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentProfile {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub ratings_faced: Vec<i64>,
    pub results_against: Vec<String>,
    pub tournaments_met: Vec<String>,
    pub rounds_played: Vec<i64>,
    #[serde(default)]
    pub dates_faced: Vec<String>,
    /// Subject's pre-event rating for each encounter, when known.
    #[serde(default)]
    pub subject_ratings: Vec<Option<i64>>,
    #[serde(default)]
    pub first_faced: String,
    pub last_faced: String,
    pub total_games: u32,
    pub wins_against: u32,
    pub losses_against: u32,
    pub draws_against: u32,
    pub avg_rating: f64,
    #[serde(default)]
    pub highest_rating: i64,
    #[serde(default)]
    pub lowest_rating: i64,
    #[serde(default)]
    pub upset_victories: u32,
    #[serde(default)]
    pub expected_losses: u32,
}

impl OpponentProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            ratings_faced: Vec::new(),
            results_against: Vec::new(),
            tournaments_met: Vec::new(),
            rounds_played: Vec::new(),
            dates_faced: Vec::new(),
            subject_ratings: Vec::new(),
            first_faced: String::new(),
            last_faced: String::new(),
            total_games: 0,
            wins_against: 0,
            losses_against: 0,
            draws_against: 0,
            avg_rating: 0.0,
            highest_rating: 0,
            lowest_rating: 0,
            upset_victories: 0,
            expected_losses: 0,
        }
    }

    /// Append one encounter and bring the running figures up to date.
    pub fn record_encounter(
        &mut self,
        encounter: &RawEncounter,
        tournament: &str,
        date: &str,
        subject_rating: Option<i64>,
    ) {
        let first = self.ratings_faced.is_empty();

        self.ratings_faced.push(encounter.rating);
        self.results_against.push(encounter.result.clone());
        self.tournaments_met.push(tournament.to_string());
        self.rounds_played.push(encounter.round);
        self.dates_faced.push(date.to_string());
        self.subject_ratings.push(subject_rating);

        self.total_games += 1;
        match encounter.outcome() {
            EncounterResult::Win => self.wins_against += 1,
            EncounterResult::Loss => self.losses_against += 1,
            EncounterResult::Draw => self.draws_against += 1,
            EncounterResult::Other => {}
        }

        // Empty string sorts before every ISO date.
        if date > self.last_faced.as_str() {
            self.last_faced = date.to_string();
        }
        if !date.is_empty() && (self.first_faced.is_empty() || date < self.first_faced.as_str()) {
            self.first_faced = date.to_string();
        }

        if first {
            self.highest_rating = encounter.rating;
            self.lowest_rating = encounter.rating;
        } else {
            self.highest_rating = self.highest_rating.max(encounter.rating);
            self.lowest_rating = self.lowest_rating.min(encounter.rating);
        }
        self.avg_rating = mean_rating(&self.ratings_faced);
    }

    pub fn outcomes(&self) -> impl Iterator<Item = EncounterResult> + '_ {
        self.results_against
            .iter()
            .map(|r| EncounterResult::from_code(r))
    }
}

pub fn mean_rating(ratings: &[i64]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    // Widened so scraped garbage near i64::MAX cannot overflow the sum.
    ratings.iter().map(|&r| i128::from(r)).sum::<i128>() as f64 / ratings.len() as f64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileOptions {
    pub names: NameRules,
    /// Drop encounters whose opponent rating is 0 (unrated or missing).
    pub skip_unrated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounts {
    pub records: usize,
    pub encounters: usize,
    pub rejected_names: usize,
    pub skipped_unrated: usize,
    pub ignored_results: usize,
}

/// Incremental fold of tournament records into opponent profiles.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    opts: ProfileOptions,
    profiles: BTreeMap<String, OpponentProfile>,
    counts: IngestCounts,
}

impl Aggregator {
    pub fn new(opts: ProfileOptions) -> Self {
        Self {
            opts,
            profiles: BTreeMap::new(),
            counts: IngestCounts::default(),
        }
    }

    pub fn ingest(&mut self, record: &TournamentRecord) {
        self.counts.records += 1;
        let subject_rating = record.subject_rating();

        for encounter in &record.opponents {
            let Some((name, title)) = self.opts.names.canonicalize(&encounter.name) else {
                log::debug!("dropping opponent name {:?} from {}", encounter.name, record.name);
                self.counts.rejected_names += 1;
                continue;
            };
            if self.opts.skip_unrated && encounter.rating == 0 {
                self.counts.skipped_unrated += 1;
                continue;
            }
            if encounter.outcome() == EncounterResult::Other {
                self.counts.ignored_results += 1;
            }

            let profile = self
                .profiles
                .entry(name)
                .or_insert_with_key(|key| OpponentProfile::new(key.clone()));
            profile.title = better_title(profile.title.take(), title.as_deref());
            profile.record_encounter(encounter, &record.name, &record.date, subject_rating);
            self.counts.encounters += 1;
        }
    }

    pub fn ingest_all<'a>(&mut self, records: impl IntoIterator<Item = &'a TournamentRecord>) {
        for record in records {
            self.ingest(record);
        }
    }

    /// Current partial state; every profile is internally consistent.
    pub fn profiles(&self) -> &BTreeMap<String, OpponentProfile> {
        &self.profiles
    }

    pub fn counts(&self) -> IngestCounts {
        self.counts
    }

    pub fn finish(self) -> BTreeMap<String, OpponentProfile> {
        self.profiles
    }
}

/// One-shot aggregation of `records` in the order given.
pub fn aggregate(
    records: &[TournamentRecord],
    opts: ProfileOptions,
) -> BTreeMap<String, OpponentProfile> {
    let mut agg = Aggregator::new(opts);
    agg.ingest_all(records);
    agg.finish()
}
