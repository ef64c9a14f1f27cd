//! TOML configuration of input exports, reference tables and the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use mobility_provider_tomtom::{CATALOG_URL, DAILY_STATS_URL, DEFAULT_CHECK_KEY, HistoryMode};

#[derive(Debug, Deserialize)]
pub(crate) struct Config {
    /// Directory every report except the TomTom history is written to.
    pub(crate) output_dir: PathBuf,
    pub(crate) google: GoogleConfig,
    pub(crate) apple: AppleConfig,
    pub(crate) waze: WazeConfig,
    pub(crate) tomtom: TomTomConfig,
    #[serde(default)]
    pub(crate) crosswalk: CrosswalkConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleConfig {
    pub(crate) raw: PathBuf,
    /// CSV with `country` and `world_region` columns.
    pub(crate) country_regions: Option<PathBuf>,
    #[serde(default)]
    pub(crate) detailed: Vec<CountrySlice>,
    #[serde(default)]
    pub(crate) world_regions: Vec<WorldRegionSlice>,
}

/// Detailed report restricted to a list of countries.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CountrySlice {
    pub(crate) name: String,
    pub(crate) countries: Vec<String>,
}

/// Detailed report restricted to a list of world regions.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorldRegionSlice {
    pub(crate) name: String,
    pub(crate) regions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppleConfig {
    pub(crate) raw: PathBuf,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WazeConfig {
    pub(crate) countries: PathBuf,
    pub(crate) cities: PathBuf,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TomTomConfig {
    /// Stored history, read back and rewritten on every refresh.
    pub(crate) report: PathBuf,
    pub(crate) alpha_codes: PathBuf,
    #[serde(default = "default_check_key")]
    pub(crate) check_key: String,
    #[serde(default)]
    pub(crate) history: HistoryMode,
    #[serde(default = "default_catalog_url")]
    pub(crate) catalog_url: String,
    #[serde(default = "default_stats_url")]
    pub(crate) stats_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CrosswalkConfig {
    /// Apple to Google country names.
    pub(crate) country: Option<PathBuf>,
    /// Apple to Google subregion names.
    pub(crate) subregion: Option<PathBuf>,
}

impl Config {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

fn default_check_key() -> String {
    DEFAULT_CHECK_KEY.to_owned()
}

fn default_catalog_url() -> String {
    CATALOG_URL.to_owned()
}

fn default_stats_url() -> String {
    DAILY_STATS_URL.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
output_dir = "reports"

[google]
raw = "raw/Global_Mobility_Report.csv"

[apple]
raw = "raw/applemobilitytrends.csv"

[waze]
countries = "raw/waze_countries.csv"
cities = "raw/waze_cities.csv"

[tomtom]
report = "reports/tomtom_trafic_index.csv"
alpha_codes = "auxiliary_data/country_alpha_codes.csv"
"#;

    #[test]
    fn optional_sections_take_defaults() {
        let config: Config = toml::from_str(MINIMAL).expect("valid config");
        assert_eq!(config.tomtom.check_key, "JPN_tokyo");
        assert_eq!(config.tomtom.history, HistoryMode::Append);
        assert_eq!(config.tomtom.catalog_url, CATALOG_URL);
        assert!(config.google.detailed.is_empty(), "no slices configured");
        assert!(config.google.country_regions.is_none(), "no lookup configured");
        assert!(config.crosswalk.country.is_none(), "no crosswalk configured");
    }

    #[test]
    fn slices_and_history_mode_are_read() {
        let text = format!(
            r#"{MINIMAL}
[[google.detailed]]
name = "brazil"
countries = ["Brazil"]

[[google.world_regions]]
name = "asia_africa"
regions = ["Asia", "Africa"]
"#
        )
        .replace(
            "alpha_codes = \"auxiliary_data/country_alpha_codes.csv\"",
            "alpha_codes = \"auxiliary_data/country_alpha_codes.csv\"\nhistory = \"replace\"",
        );
        let config: Config = toml::from_str(&text).expect("valid config");
        assert_eq!(config.tomtom.history, HistoryMode::Replace);
        assert_eq!(config.google.detailed[0].countries, ["Brazil"]);
        assert_eq!(config.google.world_regions[0].regions, ["Asia", "Africa"]);
    }

    #[test]
    fn unknown_history_mode_is_rejected() {
        let text = MINIMAL.replace(
            "[tomtom]\n",
            "[tomtom]\nhistory = \"dedupe\"\n",
        );
        assert!(toml::from_str::<Config>(&text).is_err(), "only append and replace exist");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Config::load(Path::new("does/not/exist.toml")).expect_err("no such file");
        assert!(err.to_string().contains("does/not/exist.toml"), "got {err}");
    }
}
