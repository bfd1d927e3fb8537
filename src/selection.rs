use crate::record::TournamentRecord;

/// Name/section fragments that mark a faster-than-classical event.
const FAST_CONTROL_MARKERS: &[&str] = &[
    "blitz", "rapid", "quick", "speed", "action", "bullet", "lightning", "fast", "15+", "30+",
    "g/15", "g/30", "g/60",
];

/// Which records a cache is built from. Applied once, before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    All,
    /// The `n` latest records by date.
    MostRecent(usize),
    RegularTimeControl,
    RegularMostRecent(usize),
}

impl SelectionPolicy {
    pub fn apply(&self, records: &[TournamentRecord]) -> Vec<TournamentRecord> {
        match *self {
            SelectionPolicy::All => records.to_vec(),
            SelectionPolicy::MostRecent(n) => most_recent(records.iter(), n),
            SelectionPolicy::RegularTimeControl => records
                .iter()
                .filter(|r| is_regular_time_control(&r.name, &r.section))
                .cloned()
                .collect(),
            SelectionPolicy::RegularMostRecent(n) => most_recent(
                records
                    .iter()
                    .filter(|r| is_regular_time_control(&r.name, &r.section)),
                n,
            ),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SelectionPolicy::All => "all tournaments".to_string(),
            SelectionPolicy::MostRecent(n) => format!("last {n} tournaments"),
            SelectionPolicy::RegularTimeControl => "regular time control tournaments".to_string(),
            SelectionPolicy::RegularMostRecent(n) => {
                format!("last {n} regular time control tournaments")
            }
        }
    }
}

// Stable sort keeps source order among equal dates.
fn most_recent<'a>(
    records: impl Iterator<Item = &'a TournamentRecord>,
    n: usize,
) -> Vec<TournamentRecord> {
    let mut picked: Vec<&TournamentRecord> = records.collect();
    picked.sort_by(|a, b| b.date.cmp(&a.date));
    picked.into_iter().take(n).cloned().collect()
}

pub fn is_regular_time_control(name: &str, section: &str) -> bool {
    let name = name.to_lowercase();
    let section = section.to_lowercase();
    !FAST_CONTROL_MARKERS
        .iter()
        .any(|m| name.contains(m) || section.contains(m))
}
