// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// The nine team sheets the flat uploader has always shipped with.
const DEFAULT_PLAYER_FILES: &[&str] = &[
    "Shadow_Foxes_Players.csv",
    "Bronze_Bears_Players.csv",
    "Crimson_Bulls_Players.csv",
    "Silver_Sharks_Players.csv",
    "Golden_Lions_Players.csv",
    "White_Eagles_Players.csv",
    "Black_Panthers_Players.csv",
    "Green_Wolves_Players.csv",
    "Blue_Tigers_Players.csv",
];

const DEFAULT_REGIONS: &[&str] = &["karnataka", "kerala"];

const DEFAULT_DIVISIONS: &[&str] = &[
    "U15",
    "U17",
    "U21",
    "B_Division",
    "A_Division",
    "Super_Division",
];

/// How the hierarchical pipeline replaces what is already stored for a pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceStrategy {
    /// Delete everything under the pair, then upload. Readers can observe an
    /// empty collection in between.
    #[default]
    ClearFirst,
    /// Upload first, then delete only documents that were not rewritten.
    SweepStale,
}

impl ReplaceStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            ReplaceStrategy::ClearFirst => "clear_first",
            ReplaceStrategy::SweepStale => "sweep_stale",
        }
    }
}

impl FromStr for ReplaceStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "clear_first" => Ok(ReplaceStrategy::ClearFirst),
            "sweep_stale" => Ok(ReplaceStrategy::SweepStale),
            _ => Err(anyhow!("unknown replace strategy `{}`", s)),
        }
    }
}

/// One unit of work for the hierarchical pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegionDivision {
    pub region: String,
    pub division: String,
}

impl fmt::Display for RegionDivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.division)
    }
}

/// Everything the uploaders need to know about where data lives and where it goes.
///
/// Every field has a default, so a YAML file only needs to name what differs.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// App identifier that scopes every `artifacts/<app_id>/...` collection.
    pub app_id: String,
    /// Service-account key used to authenticate against Firestore.
    pub credentials_path: PathBuf,
    /// Holds the flat rankings sheet and the fixtures/news feeds.
    pub data_dir: PathBuf,
    /// Holds the flat per-team player sheets.
    pub teams_dir: PathBuf,
    /// Root containing `<region>_football_data/` trees.
    pub hierarchy_dir: PathBuf,
    pub rankings_file: String,
    pub player_files: Vec<String>,
    /// League label given to flat ranking rows that carry none.
    pub default_league: String,
    pub regions: Vec<String>,
    pub divisions: Vec<String>,
    pub fixtures_file: String,
    pub news_file: String,
    pub replace_strategy: ReplaceStrategy,
    /// Region/division pairs processed at once within a stage.
    pub concurrency: usize,
    pub request_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            app_id: "1:140722212660:web:4dbae5a944e96a5c135f61".to_string(),
            credentials_path: PathBuf::from("serviceAccountKey.json"),
            data_dir: PathBuf::from("data"),
            teams_dir: PathBuf::from("data").join("teams"),
            hierarchy_dir: PathBuf::from("."),
            rankings_file: "Updated_Football_League_Rankings.csv".to_string(),
            player_files: DEFAULT_PLAYER_FILES.iter().map(|s| s.to_string()).collect(),
            default_league: "KSFA Premier League".to_string(),
            regions: DEFAULT_REGIONS.iter().map(|s| s.to_string()).collect(),
            divisions: DEFAULT_DIVISIONS.iter().map(|s| s.to_string()).collect(),
            fixtures_file: "football_fixtures.csv".to_string(),
            news_file: "football_league_news.csv".to_string(),
            replace_strategy: ReplaceStrategy::ClearFirst,
            concurrency: 1,
            request_timeout_secs: 30,
        }
    }
}

impl UploadConfig {
    /// Read a YAML config file, or fall back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // an empty document deserialises to unit, not to a defaulted struct
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            bail!("app_id must not be empty");
        }
        if self.app_id.contains('/') {
            bail!("app_id `{}` must not contain '/'", self.app_id);
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        for segment in self.regions.iter().chain(self.divisions.iter()) {
            if segment.trim().is_empty() || segment.contains('/') {
                bail!("invalid region/division name `{}`", segment);
            }
        }
        Ok(())
    }

    /// Extra checks for the hierarchical pipeline, which is useless without pairs.
    pub fn validate_hierarchy(&self) -> Result<()> {
        self.validate()?;
        if self.regions.is_empty() {
            bail!("no regions configured");
        }
        if self.divisions.is_empty() {
            bail!("no divisions configured");
        }
        Ok(())
    }

    /// Regions × divisions, region-major, in configured order.
    pub fn pairs(&self) -> Vec<RegionDivision> {
        self.regions
            .iter()
            .flat_map(|region| {
                self.divisions.iter().map(move |division| RegionDivision {
                    region: region.clone(),
                    division: division.clone(),
                })
            })
            .collect()
    }

    pub fn rankings_path(&self) -> PathBuf {
        self.data_dir.join(&self.rankings_file)
    }

    pub fn player_path(&self, file_name: &str) -> PathBuf {
        self.teams_dir.join(file_name)
    }

    pub fn fixtures_path(&self) -> PathBuf {
        self.data_dir.join(&self.fixtures_file)
    }

    pub fn news_path(&self) -> PathBuf {
        self.data_dir.join(&self.news_file)
    }

    /// `<hierarchy_dir>/<region>_football_data`
    pub fn region_dir(&self, region: &str) -> PathBuf {
        self.hierarchy_dir.join(format!("{}_football_data", region))
    }

    /// `<region_dir>/<division>_League_Rankings.csv`
    pub fn division_rankings_path(&self, pair: &RegionDivision) -> PathBuf {
        self.region_dir(&pair.region)
            .join(format!("{}_League_Rankings.csv", pair.division))
    }

    /// `<region_dir>/teams/<division>`
    pub fn division_teams_dir(&self, pair: &RegionDivision) -> PathBuf {
        self.region_dir(&pair.region)
            .join("teams")
            .join(&pair.division)
    }
}
