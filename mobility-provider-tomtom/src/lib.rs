//! Acquisition and normalizer for the TomTom Traffic Index.
//!
//! Unlike the other providers, TomTom has no downloadable export: the city catalog is read from
//! the ranking page and every city's daily statistics are fetched one by one. The result is kept
//! as a growing history on disk and only refreshed when a reference city shows a new day.

mod client;
mod reference;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use mobility_core::{
    model::{CanonicalTable, GeoKey, Granularity, MetricRow, ProviderId, ProviderMeta},
    ports::{PortError, ProviderNormalizer},
    table::{RawTable, cell, parse_date, parse_value},
};

pub use client::{CATALOG_URL, DAILY_STATS_URL, TomTomClient};
pub use reference::{CountryCodes, KeyExceptions, api_key};

/// Reference series used to decide whether new data has been published.
pub const DEFAULT_CHECK_KEY: &str = "JPN_tokyo";

/// Output metrics, in column order.
pub const METRICS: [&str; 2] = ["congestion", "diffRatio"];

/// One city of the traffic index catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogCity {
    /// City display name.
    pub name: String,
    /// ISO 3166 alpha-2 country code.
    pub country: String,
    /// Country display name.
    #[serde(rename = "countryName")]
    pub country_name: String,
    /// Continent name.
    pub continent: String,
    /// Catalog key of the city.
    pub key: String,
}

/// One day of a city's traffic statistics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyStat {
    /// Calendar day.
    pub date: NaiveDate,
    /// Congestion level.
    pub congestion: Option<f64>,
    /// Change against the same day of the reference year.
    #[serde(rename = "diffRatio")]
    pub diff_ratio: Option<f64>,
}

/// Daily statistics of one catalog city.
#[derive(Debug, Clone, PartialEq)]
pub struct CitySeries {
    /// Country display name.
    pub country: String,
    /// City display name.
    pub city: String,
    /// Statistics in the order the API returned them.
    pub stats: Vec<DailyStat>,
}

/// Source of traffic index data.
#[async_trait]
pub trait TrafficIndexPort: Send + Sync {
    /// Every city of the index.
    async fn city_catalog(&self) -> Result<Vec<CatalogCity>, PortError>;
    /// Daily statistics of the city identified by `api_key` (`<ISO3>_<key>`).
    async fn daily_stats(&self, api_key: &str) -> Result<Vec<DailyStat>, PortError>;
}

/// How freshly downloaded data is combined with the stored report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Concatenate stored and fresh rows, keeping every row.
    #[default]
    Append,
    /// Fresh rows replace stored rows with the same key.
    Replace,
}

/// TomTom normalizer.
pub struct TomTomNormalizer {
    meta: ProviderMeta,
}

impl TomTomNormalizer {
    /// Create a new normalizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: provider_meta(),
        }
    }
}

impl Default for TomTomNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderNormalizer for TomTomNormalizer {
    type Input = [CitySeries];

    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    fn normalize(
        &self,
        input: &[CitySeries],
        granularity: Granularity,
    ) -> Result<CanonicalTable, PortError> {
        if granularity != Granularity::Regions {
            return Err(PortError::unsupported(ProviderId::TomTom, granularity));
        }
        build_report(input)
    }
}

/// Long table keyed by `(country, city)`, sorted by key then date.
///
/// # Errors
///
/// Returns [`PortError::RowLength`] only if the layout is inconsistent, which cannot happen for
/// well-formed series.
pub fn build_report(series: &[CitySeries]) -> Result<CanonicalTable, PortError> {
    let mut table = CanonicalTable::new(&["country", "city"], &METRICS);
    for city in series {
        for stat in &city.stats {
            table.push(MetricRow {
                key: GeoKey::new(vec![city.country.clone(), city.city.clone()], stat.date),
                values: vec![stat.congestion, stat.diff_ratio],
            })?;
        }
    }
    table.sort();
    Ok(table)
}

/// Fetch the catalog and every city's statistics, in catalog order.
///
/// Requests are sequential and the first failure aborts the run.
///
/// # Errors
///
/// Returns [`PortError::UnknownCountryCode`] for a catalog country without an alpha-3 code, and
/// whatever the port reports for a failed request.
pub async fn download<P>(
    port: &P,
    codes: &CountryCodes,
    exceptions: &KeyExceptions,
) -> Result<Vec<CitySeries>, PortError>
where
    P: TrafficIndexPort + ?Sized,
{
    let catalog = port.city_catalog().await?;
    info!(cities = catalog.len(), "Fetched TomTom city catalog");

    let mut series = Vec::with_capacity(catalog.len());
    for city in catalog {
        let key = api_key(&city, codes, exceptions)?;
        debug!(api_key = %key, "Fetching daily stats");
        let stats = port.daily_stats(&key).await?;
        series.push(CitySeries {
            country: city.country_name,
            city: city.name,
            stats,
        });
    }
    Ok(series)
}

/// Whether the reference series has a day the stored report does not.
///
/// A missing report always counts as an update. Otherwise the date of the last element of the
/// reference series is compared with the latest stored date.
///
/// # Errors
///
/// Returns [`PortError::EmptySeries`] when the reference series is empty, and whatever the port
/// reports for a failed request.
pub async fn check_update<P>(
    port: &P,
    stored: Option<&CanonicalTable>,
    check_key: &str,
) -> Result<bool, PortError>
where
    P: TrafficIndexPort + ?Sized,
{
    let Some(stored) = stored else {
        info!("No stored TomTom report");
        return Ok(true);
    };
    let stats = port.daily_stats(check_key).await?;
    let latest = stats
        .last()
        .map(|stat| stat.date)
        .ok_or_else(|| PortError::EmptySeries(check_key.to_owned()))?;
    let known = stored.max_date();
    info!(%latest, ?known, "Checked TomTom reference series");
    Ok(known != Some(latest))
}

/// Combine the stored report with freshly downloaded rows, sorted by key then date.
///
/// # Errors
///
/// Returns [`PortError::ColumnMismatch`] when the layouts differ.
pub fn merge_with_history(
    stored: CanonicalTable,
    fresh: CanonicalTable,
    mode: HistoryMode,
) -> Result<CanonicalTable, PortError> {
    let mut merged = match mode {
        HistoryMode::Append => stored,
        HistoryMode::Replace => {
            let replaced: HashSet<&GeoKey> = fresh.rows().iter().map(|row| &row.key).collect();
            let mut kept = CanonicalTable::new(stored.geo_columns(), stored.metric_columns());
            for row in stored.rows() {
                if !replaced.contains(&row.key) {
                    kept.push(row.clone())?;
                }
            }
            kept
        }
    };
    merged.extend(fresh)?;
    merged.sort();
    Ok(merged)
}

/// Read a report previously written by the engine back into a table.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] when a report column is absent, and parse errors for
/// malformed dates or values.
pub fn stored_report(raw: &RawTable) -> Result<CanonicalTable, PortError> {
    let country = raw.column("country")?;
    let city = raw.column("city")?;
    let date = raw.column("date")?;
    let metrics = METRICS
        .iter()
        .map(|name| raw.column(name).map(|pos| (*name, pos)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = CanonicalTable::new(&["country", "city"], &METRICS);
    for row in raw.rows() {
        table.push(MetricRow {
            key: GeoKey::new(
                vec![cell(row, country).to_owned(), cell(row, city).to_owned()],
                parse_date(cell(row, date))?,
            ),
            values: metrics
                .iter()
                .map(|&(name, pos)| parse_value(name, cell(row, pos)))
                .collect::<Result<_, _>>()?,
        })?;
    }
    Ok(table)
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta::new(ProviderId::TomTom, "TomTom Traffic Index")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    struct FakeIndex {
        catalog: Vec<CatalogCity>,
        stats: HashMap<String, Vec<DailyStat>>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeIndex {
        fn new(catalog: Vec<CatalogCity>, stats: &[(&str, Vec<DailyStat>)]) -> Self {
            Self {
                catalog,
                stats: stats
                    .iter()
                    .map(|(key, series)| ((*key).to_owned(), series.clone()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl TrafficIndexPort for FakeIndex {
        async fn city_catalog(&self) -> Result<Vec<CatalogCity>, PortError> {
            Ok(self.catalog.clone())
        }

        async fn daily_stats(&self, api_key: &str) -> Result<Vec<DailyStat>, PortError> {
            self.requested.lock().expect("lock").push(api_key.to_owned());
            self.stats
                .get(api_key)
                .cloned()
                .ok_or_else(|| PortError::Internal(format!("404 for {api_key}")))
        }
    }

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, day).expect("valid date")
    }

    fn stat(date: u32, congestion: f64) -> DailyStat {
        DailyStat {
            date: day(date),
            congestion: Some(congestion),
            diff_ratio: Some(-0.1),
        }
    }

    fn city(name: &str, country: &str, country_name: &str, key: &str) -> CatalogCity {
        CatalogCity {
            name: name.to_owned(),
            country: country.to_owned(),
            country_name: country_name.to_owned(),
            continent: "Asia".to_owned(),
            key: key.to_owned(),
        }
    }

    fn codes() -> CountryCodes {
        CountryCodes::from_pairs([("JP", "JPN"), ("IN", "IND")])
    }

    fn report(days: &[(u32, f64)]) -> CanonicalTable {
        build_report(&[CitySeries {
            country: "Japan".to_owned(),
            city: "Tokyo".to_owned(),
            stats: days.iter().map(|&(date, value)| stat(date, value)).collect(),
        }])
        .expect("valid series")
    }

    #[tokio::test]
    async fn download_resolves_keys_in_catalog_order() {
        let index = FakeIndex::new(
            vec![
                city("Tokyo", "JP", "Japan", "tokyo"),
                city("Bengaluru", "IN", "India", "bengaluru"),
            ],
            &[
                ("JPN_tokyo", vec![stat(2, 30.0)]),
                ("IND_bangalore", vec![stat(1, 50.0), stat(2, 55.0)]),
            ],
        );
        let series = download(&index, &codes(), &KeyExceptions::default())
            .await
            .expect("all cities reachable");
        assert_eq!(index.requested(), ["JPN_tokyo", "IND_bangalore"]);

        let table = TomTomNormalizer::new()
            .normalize(&series, Granularity::Regions)
            .expect("regions view");
        assert_eq!(table.columns(), ["country", "city", "date", "congestion", "diffRatio"]);
        let keys: Vec<_> = table
            .rows()
            .iter()
            .map(|row| format!("{}@{}", row.key.geo.join("/"), row.key.date))
            .collect();
        assert_eq!(
            keys,
            [
                "India/Bengaluru@2021-03-01",
                "India/Bengaluru@2021-03-02",
                "Japan/Tokyo@2021-03-02",
            ]
        );
    }

    #[tokio::test]
    async fn first_failure_aborts_the_download() {
        let index = FakeIndex::new(
            vec![
                city("Osaka", "JP", "Japan", "osaka"),
                city("Tokyo", "JP", "Japan", "tokyo"),
            ],
            &[("JPN_tokyo", vec![stat(2, 30.0)])],
        );
        let result = download(&index, &codes(), &KeyExceptions::default()).await;
        assert!(matches!(result, Err(PortError::Internal(_))), "osaka is missing");
        assert_eq!(index.requested(), ["JPN_osaka"]);
    }

    #[tokio::test]
    async fn unknown_country_stops_before_any_stats_request() {
        let index = FakeIndex::new(vec![city("Nowhere", "XX", "Nowhere", "nowhere")], &[]);
        let result = download(&index, &codes(), &KeyExceptions::default()).await;
        assert!(matches!(result, Err(PortError::UnknownCountryCode(_))), "XX has no alpha3");
        assert!(index.requested().is_empty(), "no request was sent");
    }

    #[tokio::test]
    async fn update_detection_compares_latest_days() {
        let index = FakeIndex::new(vec![], &[("JPN_tokyo", vec![stat(1, 30.0), stat(3, 31.0)])]);

        let stale = report(&[(1, 30.0), (2, 32.0)]);
        assert!(
            check_update(&index, Some(&stale), DEFAULT_CHECK_KEY).await.expect("reachable"),
            "day 3 is new"
        );

        let current = report(&[(1, 30.0), (3, 31.0)]);
        assert!(
            !check_update(&index, Some(&current), DEFAULT_CHECK_KEY).await.expect("reachable"),
            "day 3 is known"
        );
    }

    #[tokio::test]
    async fn missing_report_always_updates() {
        let index = FakeIndex::new(vec![], &[]);
        let updated = check_update(&index, None, DEFAULT_CHECK_KEY).await.expect("no request");
        assert!(updated, "nothing stored yet");
        assert!(index.requested().is_empty(), "reference series not needed");
    }

    #[tokio::test]
    async fn empty_reference_series_is_an_error() {
        let index = FakeIndex::new(vec![], &[("JPN_tokyo", vec![])]);
        let result = check_update(&index, Some(&report(&[(1, 30.0)])), DEFAULT_CHECK_KEY).await;
        assert!(matches!(result, Err(PortError::EmptySeries(key)) if key == "JPN_tokyo"), "empty");
    }

    #[test]
    fn append_keeps_every_row() {
        let merged = merge_with_history(
            report(&[(1, 30.0), (2, 32.0)]),
            report(&[(2, 40.0), (3, 41.0)]),
            HistoryMode::Append,
        )
        .expect("same layout");
        let congestion: Vec<_> = merged.rows().iter().map(|row| row.values[0]).collect();
        assert_eq!(congestion, [Some(30.0), Some(32.0), Some(40.0), Some(41.0)]);
    }

    #[test]
    fn replace_prefers_fresh_rows() {
        let merged = merge_with_history(
            report(&[(1, 30.0), (2, 32.0)]),
            report(&[(2, 40.0), (3, 41.0)]),
            HistoryMode::Replace,
        )
        .expect("same layout");
        let congestion: Vec<_> = merged.rows().iter().map(|row| row.values[0]).collect();
        assert_eq!(congestion, [Some(30.0), Some(40.0), Some(41.0)]);
        assert!(merged.duplicate_keys().is_empty(), "keys are unique");
    }

    #[test]
    fn stored_reports_read_back() {
        let raw = RawTable::from_reader(
            "country,city,date,congestion,diffRatio\nJapan,Tokyo,2021-03-01,30,\n".as_bytes(),
        )
        .expect("valid csv");
        let table = stored_report(&raw).expect("report layout");
        assert_eq!(table.max_date(), Some(day(1)));
        assert_eq!(table.rows()[0].values, [Some(30.0), None]);
    }

    #[test]
    fn history_mode_reads_from_config_values() {
        #[derive(Deserialize)]
        struct Wrapper {
            history: HistoryMode,
        }
        let wrapper: Wrapper =
            serde_json::from_str(r#"{"history": "replace"}"#).expect("valid mode");
        assert_eq!(wrapper.history, HistoryMode::Replace);
    }
}
