//! Canonical opponent names.
//!
//! Scraped crosstables leak page boilerplate into the name column, so every
//! raw name is cleaned here before it is used as a profile key. An empty
//! return value means "drop this encounter".

pub const DEFAULT_MAX_NAME_LEN: usize = 50;
pub const RICH_MAX_NAME_LEN: usize = 60;
const MIN_NAME_LEN: usize = 3;

/// Substrings that only appear when the upstream parser grabbed page text
/// instead of a player name.
const SCRAPE_ARTIFACTS: &[&str] = &[
    "click on a section name",
    "the ratings shown on this page",
    "section(s),",
    "players",
    "not official published ratings",
    "may change from time to time",
    "using them for pairing purposes",
    "should only be done if this has been advertised",
    "advance publicity and is announced",
];

/// Checked in order; the first matching prefix wins.
pub const TITLES: &[&str] = &[
    "GM", "IM", "FM", "WGM", "WIM", "WFM", "EXPERT", "MASTER", "CLASS A",
];

const EDGE_PUNCTUATION: &[char] = &['.', ',', ';', ':', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRules {
    pub max_len: usize,
    pub extract_titles: bool,
}

impl Default for NameRules {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_NAME_LEN,
            extract_titles: false,
        }
    }
}

impl NameRules {
    /// Clean `raw` and optionally split off a title token.
    /// `None` when the name is rejected.
    pub fn canonicalize(&self, raw: &str) -> Option<(String, Option<String>)> {
        let name = normalize_name(raw, self.max_len);
        if name.is_empty() {
            return None;
        }
        if !self.extract_titles {
            return Some((name, None));
        }
        let (name, title) = extract_title(&name);
        if name.is_empty() {
            return None;
        }
        Some((name, title))
    }
}

pub fn normalize_name(raw: &str, max_len: usize) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let lowered = raw.to_lowercase();
    if SCRAPE_ARTIFACTS.iter().any(|a| lowered.contains(a)) {
        return String::new();
    }

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = collapsed.chars().count();
    if !(MIN_NAME_LEN..=max_len).contains(&len) {
        return String::new();
    }
    if !collapsed.chars().any(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }

    collapsed.trim_matches(EDGE_PUNCTUATION).trim().to_string()
}

/// Split a leading title token (`"GM CARLSEN, MAGNUS"` → `("CARLSEN, MAGNUS", Some("GM"))`).
pub fn extract_title(name: &str) -> (String, Option<String>) {
    for title in TITLES {
        let Some(head) = name.get(..title.len()) else {
            continue;
        };
        let rest = &name[title.len()..];
        if head.eq_ignore_ascii_case(title) && (rest.is_empty() || rest.starts_with(' ')) {
            return (rest.trim().to_string(), Some((*title).to_string()));
        }
    }
    (name.to_string(), None)
}

/// Longer title is treated as more specific; on a tie the one already held stays.
pub fn better_title(current: Option<String>, candidate: Option<&str>) -> Option<String> {
    match (current, candidate) {
        (None, Some(c)) => Some(c.to_string()),
        (Some(cur), Some(c)) if c.len() > cur.len() => Some(c.to_string()),
        (cur, _) => cur,
    }
}
