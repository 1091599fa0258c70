use crate::config::RegionDivision;

pub const FIXTURES: &str = "fixtures";
pub const NEWS: &str = "news";

fn public_data(app_id: &str) -> String {
    format!("artifacts/{}/public/data", app_id)
}

/// `artifacts/<app>/public/data/leagueRankings`
pub fn league_rankings(app_id: &str) -> String {
    format!("{}/leagueRankings", public_data(app_id))
}

/// `artifacts/<app>/public/data/teamPlayers`
pub fn team_players(app_id: &str) -> String {
    format!("{}/teamPlayers", public_data(app_id))
}

/// `artifacts/<app>/public/data/<region>/<division>/Rankings`
pub fn division_rankings(app_id: &str, pair: &RegionDivision) -> String {
    format!(
        "{}/{}/{}/Rankings",
        public_data(app_id),
        pair.region,
        pair.division
    )
}

/// `artifacts/<app>/public/data/<region>/<division>/Teams`
pub fn division_teams(app_id: &str, pair: &RegionDivision) -> String {
    format!(
        "{}/{}/{}/Teams",
        public_data(app_id),
        pair.region,
        pair.division
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_paths() {
        let pair = RegionDivision {
            region: "karnataka".into(),
            division: "U15".into(),
        };
        assert_eq!(
            league_rankings("app"),
            "artifacts/app/public/data/leagueRankings"
        );
        assert_eq!(team_players("app"), "artifacts/app/public/data/teamPlayers");
        assert_eq!(
            division_rankings("app", &pair),
            "artifacts/app/public/data/karnataka/U15/Rankings"
        );
        assert_eq!(
            division_teams("app", &pair),
            "artifacts/app/public/data/karnataka/U15/Teams"
        );
    }
}
