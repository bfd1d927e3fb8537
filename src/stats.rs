use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{OpponentProfile, mean_rating};
use crate::record::{EncounterResult, parse_iso_date};

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RatingBand {
    Below1800,
    From1800To1999,
    From2000To2199,
    From2200To2399,
    From2400,
}

impl RatingBand {
    pub const ALL: [RatingBand; 5] = [
        RatingBand::Below1800,
        RatingBand::From1800To1999,
        RatingBand::From2000To2199,
        RatingBand::From2200To2399,
        RatingBand::From2400,
    ];

    /// Lower bound inclusive, upper bound exclusive; the top band is open-ended.
    pub fn of(rating: f64) -> RatingBand {
        if rating >= 2400.0 {
            RatingBand::From2400
        } else if rating >= 2200.0 {
            RatingBand::From2200To2399
        } else if rating >= 2000.0 {
            RatingBand::From2000To2199
        } else if rating >= 1800.0 {
            RatingBand::From1800To1999
        } else {
            RatingBand::Below1800
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RatingBand::Below1800 => "<1800",
            RatingBand::From1800To1999 => "1800-1999",
            RatingBand::From2000To2199 => "2000-2199",
            RatingBand::From2200To2399 => "2200-2399",
            RatingBand::From2400 => "2400+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileStats {
    pub win_rate: f64,
    pub loss_rate: f64,
    pub draw_rate: f64,
    pub upset_victories: u32,
    pub expected_losses: u32,
    pub games_vs_higher_rated: u32,
    /// Mean of (subject rating - opponent rating) over encounters where the
    /// subject's rating is known.
    pub avg_rating_difference: Option<f64>,
    pub encounter_span_days: i64,
}

pub fn percentage(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

pub fn win_rate(profile: &OpponentProfile) -> f64 {
    percentage(profile.wins_against, profile.total_games)
}

#[derive(Debug, Clone, Copy, Default)]
struct RatingComparison {
    upsets: u32,
    expected_losses: u32,
    vs_higher: u32,
    diff_sum: i128,
    diff_n: u32,
}

fn compare_ratings(profile: &OpponentProfile) -> RatingComparison {
    let mut out = RatingComparison::default();
    for ((outcome, opp), subject) in profile
        .outcomes()
        .zip(&profile.ratings_faced)
        .zip(&profile.subject_ratings)
    {
        let Some(subject) = *subject else {
            continue;
        };
        out.diff_sum += i128::from(subject) - i128::from(*opp);
        out.diff_n += 1;
        if subject < *opp {
            out.vs_higher += 1;
        }
        match outcome {
            EncounterResult::Win if *opp > subject => out.upsets += 1,
            EncounterResult::Loss if *opp < subject => out.expected_losses += 1,
            _ => {}
        }
    }
    out
}

pub fn profile_stats(profile: &OpponentProfile) -> ProfileStats {
    let cmp = compare_ratings(profile);
    let span = match (
        parse_iso_date(&profile.first_faced),
        parse_iso_date(&profile.last_faced),
    ) {
        (Some(first), Some(last)) => (last - first).num_days(),
        _ => 0,
    };
    ProfileStats {
        win_rate: win_rate(profile),
        loss_rate: percentage(profile.losses_against, profile.total_games),
        draw_rate: percentage(profile.draws_against, profile.total_games),
        upset_victories: cmp.upsets,
        expected_losses: cmp.expected_losses,
        games_vs_higher_rated: cmp.vs_higher,
        avg_rating_difference: (cmp.diff_n > 0).then(|| cmp.diff_sum as f64 / cmp.diff_n as f64),
        encounter_span_days: span,
    }
}

/// Refresh the derived scalars of `profile` from its encounter sequences.
/// The sequences and outcome counters are left untouched.
pub fn derive_profile(profile: &mut OpponentProfile) {
    let cmp = compare_ratings(profile);
    profile.upset_victories = cmp.upsets;
    profile.expected_losses = cmp.expected_losses;
    profile.avg_rating = mean_rating(&profile.ratings_faced);
    profile.highest_rating = profile.ratings_faced.iter().copied().max().unwrap_or(0);
    profile.lowest_rating = profile.ratings_faced.iter().copied().min().unwrap_or(0);
}

pub fn derive_all(profiles: &mut BTreeMap<String, OpponentProfile>) {
    for profile in profiles.values_mut() {
        derive_profile(profile);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCount {
    pub band: RatingBand,
    pub label: &'static str,
    pub count: usize,
}

pub fn rating_distribution<'a>(
    profiles: impl IntoIterator<Item = &'a OpponentProfile>,
) -> Vec<BandCount> {
    let mut counts = [0usize; RatingBand::ALL.len()];
    for p in profiles {
        counts[RatingBand::of(p.avg_rating) as usize] += 1;
    }
    RatingBand::ALL
        .iter()
        .zip(counts)
        .map(|(band, count)| BandCount {
            band: *band,
            label: band.label(),
            count,
        })
        .collect()
}

/// Whole-cache summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub total_opponents: usize,
    pub total_games: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_draws: u64,
    pub win_percentage: f64,
    /// Mean of each opponent's `avg_rating`; every opponent counts once.
    pub avg_opponent_rating: f64,
    /// Mean over every rating faced; frequent opponents weigh more.
    pub game_weighted_opponent_rating: f64,
    pub rating_distribution: Vec<BandCount>,
    pub title_distribution: BTreeMap<String, usize>,
    pub upset_victories: u64,
    pub games_vs_higher_rated: u64,
    pub upset_rate: f64,
    pub last_updated: Option<String>,
}

pub fn compute_statistics(
    profiles: &BTreeMap<String, OpponentProfile>,
    last_updated: Option<&str>,
) -> CacheStatistics {
    let total_opponents = profiles.len();
    let mut total_games = 0u64;
    let mut total_wins = 0u64;
    let mut total_losses = 0u64;
    let mut total_draws = 0u64;
    let mut avg_sum = 0.0;
    let mut rating_sum = 0i128;
    let mut rating_n = 0u64;
    let mut upsets = 0u64;
    let mut vs_higher = 0u64;
    let mut titles: BTreeMap<String, usize> = BTreeMap::new();

    for p in profiles.values() {
        total_games += u64::from(p.total_games);
        total_wins += u64::from(p.wins_against);
        total_losses += u64::from(p.losses_against);
        total_draws += u64::from(p.draws_against);
        avg_sum += p.avg_rating;
        rating_sum += p.ratings_faced.iter().map(|&r| i128::from(r)).sum::<i128>();
        rating_n += p.ratings_faced.len() as u64;
        let cmp = compare_ratings(p);
        upsets += u64::from(cmp.upsets);
        vs_higher += u64::from(cmp.vs_higher);
        let title = p.title.clone().unwrap_or_else(|| UNTITLED.to_string());
        *titles.entry(title).or_insert(0) += 1;
    }

    let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };

    CacheStatistics {
        total_opponents,
        total_games,
        total_wins,
        total_losses,
        total_draws,
        win_percentage: ratio(total_wins as f64, total_games as f64) * 100.0,
        avg_opponent_rating: ratio(avg_sum, total_opponents as f64),
        game_weighted_opponent_rating: ratio(rating_sum as f64, rating_n as f64),
        rating_distribution: rating_distribution(profiles.values()),
        title_distribution: titles,
        upset_victories: upsets,
        games_vs_higher_rated: vs_higher,
        upset_rate: ratio(upsets as f64, vs_higher as f64) * 100.0,
        last_updated: last_updated.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawEncounter;

    fn profile_with(name: &str, games: &[(i64, &str, Option<i64>, &str)]) -> OpponentProfile {
        let mut p = OpponentProfile::new(name);
        for (rating, result, subject, date) in games {
            let enc = RawEncounter {
                name: name.to_string(),
                rating: *rating,
                result: result.to_string(),
                round: 1,
            };
            p.record_encounter(&enc, "T", date, *subject);
        }
        p
    }

    #[test]
    fn band_boundaries_are_half_open() {
        assert_eq!(RatingBand::of(1799.99), RatingBand::Below1800);
        assert_eq!(RatingBand::of(1800.0), RatingBand::From1800To1999);
        assert_eq!(RatingBand::of(1999.5), RatingBand::From1800To1999);
        assert_eq!(RatingBand::of(2200.0), RatingBand::From2200To2399);
        assert_eq!(RatingBand::of(2400.0), RatingBand::From2400);
        assert_eq!(RatingBand::of(3100.0), RatingBand::From2400);
        assert_eq!(RatingBand::of(0.0), RatingBand::Below1800);
    }

    #[test]
    fn upsets_need_known_subject_rating() {
        let mut p = profile_with(
            "ROE, RICK",
            &[
                (2100, "W", Some(1900), "2024-01-01"),
                (2100, "W", None, "2024-02-01"),
                (1700, "L", Some(1900), "2024-03-01"),
                (2100, "L", Some(1900), "2024-04-01"),
            ],
        );
        let s = profile_stats(&p);
        assert_eq!(s.upset_victories, 1);
        assert_eq!(s.expected_losses, 1);
        assert_eq!(s.games_vs_higher_rated, 2);
        assert_eq!(s.encounter_span_days, 91);
        assert_eq!(s.win_rate, 50.0);

        derive_profile(&mut p);
        assert_eq!(p.upset_victories, 1);
        assert_eq!(p.expected_losses, 1);
        assert_eq!(p.total_games, 4);
    }

    #[test]
    fn zero_games_yield_zero_rates() {
        let p = OpponentProfile::new("EMPTY, PAT");
        let s = profile_stats(&p);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.avg_rating_difference, None);
        assert_eq!(s.encounter_span_days, 0);
    }

    #[test]
    fn average_opponent_rating_is_unweighted() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "A".to_string(),
            profile_with("A", &[(2000, "W", None, ""), (2000, "W", None, ""), (2000, "D", None, "")]),
        );
        profiles.insert("B".to_string(), profile_with("B", &[(1600, "L", None, "")]));

        let stats = compute_statistics(&profiles, None);
        assert_eq!(stats.total_opponents, 2);
        assert_eq!(stats.total_games, 4);
        assert_eq!(stats.avg_opponent_rating, 1800.0);
        assert_eq!(stats.game_weighted_opponent_rating, 1900.0);
        assert_eq!(stats.win_percentage, 50.0);
        assert_eq!(stats.title_distribution.get(UNTITLED), Some(&2));
        let counts: Vec<usize> = stats.rating_distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 0, 1, 0, 0]);
    }

    #[test]
    fn empty_cache_statistics_are_zero() {
        let stats = compute_statistics(&BTreeMap::new(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(stats.total_opponents, 0);
        assert_eq!(stats.win_percentage, 0.0);
        assert_eq!(stats.avg_opponent_rating, 0.0);
        assert_eq!(stats.upset_rate, 0.0);
        assert_eq!(stats.last_updated.as_deref(), Some("2024-01-01T00:00:00Z"));
    }
}
