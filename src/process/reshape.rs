use serde_json::Value;

use super::CsvTable;
use crate::store::Document;

/// Source ranking headers and the names the league pages read.
pub const RANKING_RENAMES: &[(&str, &str)] = &[("Won", "Wins"), ("Draw", "Draws"), ("Lost", "Losses")];

/// Column holding the team name in a rankings sheet.
pub const TEAM_COLUMN: &str = "Team";

/// Rename columns in place, in the header row and in every record.
/// A rename onto an existing column replaces it.
pub fn rename_columns(table: &mut CsvTable, renames: &[(&str, &str)]) {
    for (from, to) in renames {
        if !table.has_column(from) {
            continue;
        }
        table.headers.retain(|h| h != to);
        for h in table.headers.iter_mut() {
            if h == from {
                *h = to.to_string();
            }
        }
        for record in table.records.iter_mut() {
            if let Some(value) = record.remove(*from) {
                record.insert(to.to_string(), value);
            }
        }
    }
}

/// Add `name = value` to every record when the sheet has no such column.
/// Returns whether the column was added.
pub fn ensure_column(table: &mut CsvTable, name: &str, value: Value) -> bool {
    if table.has_column(name) {
        return false;
    }
    table.headers.push(name.to_string());
    for record in table.records.iter_mut() {
        record.insert(name.to_string(), value.clone());
    }
    true
}

/// Ranking sheet as the league pages expect it: renamed counters plus a tag
/// column (`League` for the flat sheet, `division` for the per-division sheets).
pub fn prepare_rankings(table: &mut CsvTable, tag_column: &str, tag_value: &str) {
    rename_columns(table, RANKING_RENAMES);
    ensure_column(table, tag_column, Value::String(tag_value.to_string()));
}

/// Document id taken from `field`. Null, blank and non-scalar values yield `None`.
pub fn document_id(record: &Document, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{parse_csv, CellMode};
    use serde_json::json;
    use std::io::Cursor;

    fn table(text: &str) -> CsvTable {
        parse_csv(Cursor::new(text.as_bytes()), CellMode::Infer).unwrap()
    }

    #[test]
    fn flat_rankings_shape() {
        let mut t = table("Team,Won,Draw,Lost\nFoo,1,2,3\n");
        prepare_rankings(&mut t, "League", "KSFA Premier League");
        assert_eq!(
            Value::Object(t.records[0].clone()),
            json!({
                "Team": "Foo",
                "Wins": 1,
                "Draws": 2,
                "Losses": 3,
                "League": "KSFA Premier League"
            })
        );
        assert_eq!(t.headers, vec!["Team", "Wins", "Draws", "Losses", "League"]);
    }

    #[test]
    fn existing_tag_column_is_kept() {
        let mut t = table("Team,League\nFoo,Kerala Cup\nBar,\n");
        prepare_rankings(&mut t, "League", "KSFA Premier League");
        assert_eq!(t.records[0]["League"], json!("Kerala Cup"));
        // present-but-empty cells are left alone
        assert_eq!(t.records[1]["League"], Value::Null);
    }

    #[test]
    fn rename_replaces_clashing_column() {
        let mut t = table("Won,Wins\n5,9\n");
        rename_columns(&mut t, RANKING_RENAMES);
        assert_eq!(t.headers, vec!["Wins"]);
        assert_eq!(t.records[0]["Wins"], json!(5));
    }

    #[test]
    fn document_ids() {
        let t = table("Team,Rank\nFoo,1\n,2\n   ,3\n");
        assert_eq!(document_id(&t.records[0], TEAM_COLUMN), Some("Foo".into()));
        assert_eq!(document_id(&t.records[1], TEAM_COLUMN), None);
        assert_eq!(document_id(&t.records[0], "Rank"), Some("1".into()));
        assert_eq!(document_id(&t.records[0], "Missing"), None);
    }
}
