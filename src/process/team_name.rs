use once_cell::sync::Lazy;
use regex::Regex;

static SHEET_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(_Players)?\.csv$").expect("static regex is valid"));

/// Team name from a player or team sheet filename:
/// `Blue_Tigers_Players.csv` and `Blue_Tigers.csv` both give `Blue Tigers`.
///
/// Anything else passes through with underscores turned into spaces.
pub fn extract_team_name(file_name: &str) -> String {
    SHEET_SUFFIX.replace(file_name, "").replace('_', " ")
}
