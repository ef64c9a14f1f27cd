//! Normalizer for the Waze country-level and city-level driving trend exports.

use chrono::NaiveDate;
use tracing::info;

use mobility_core::{
    model::{
        CanonicalTable, GeoKey, Granularity, MetricRow, ProviderId, ProviderMeta, TOTAL, or_total,
    },
    ports::{PortError, ProviderNormalizer},
    table::{RawTable, cell, parse_value},
};

/// Change column in both exports, expressed as a fraction.
pub const CHANGE_COLUMN: &str = "% Change In Waze Driven Miles/KMs";

/// Output metric, expressed as a percentage.
pub const METRIC: &str = "driving_waze";

/// The two Waze exports.
#[derive(Debug, Clone, Default)]
pub struct WazeReports {
    /// Country-level export (`Country`, `Date`, change).
    pub countries: RawTable,
    /// City-level export (`Country`, `City`, `Date`, change).
    pub cities: RawTable,
}

/// Waze normalizer.
pub struct WazeNormalizer {
    meta: ProviderMeta,
}

impl WazeNormalizer {
    /// Create a new normalizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: provider_meta(),
        }
    }
}

impl Default for WazeNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderNormalizer for WazeNormalizer {
    type Input = WazeReports;

    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    fn normalize(
        &self,
        input: &WazeReports,
        granularity: Granularity,
    ) -> Result<CanonicalTable, PortError> {
        if granularity != Granularity::Regions {
            return Err(PortError::unsupported(ProviderId::Waze, granularity));
        }
        build_report(input)
    }
}

/// Union of both exports with `(country, city, geo_type)` keys and the change as a percentage,
/// sorted by key then date. Country rows get `city = "Total"`.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] when an export lacks a column, and parse errors for
/// malformed dates or values.
pub fn build_report(reports: &WazeReports) -> Result<CanonicalTable, PortError> {
    let mut table = CanonicalTable::new(&["country", "city", "geo_type"], &[METRIC]);
    append(&mut table, &reports.countries, "country")?;
    append(&mut table, &reports.cities, "city")?;
    table.sort();

    info!(rows = table.len(), "Built Waze report");
    Ok(table)
}

fn append(table: &mut CanonicalTable, raw: &RawTable, geo_type: &str) -> Result<(), PortError> {
    let country = raw.column("Country")?;
    let city = match geo_type {
        "city" => Some(raw.column("City")?),
        _ => None,
    };
    let date = raw.column("Date")?;
    let change = raw.column(CHANGE_COLUMN)?;

    for row in raw.rows() {
        let city_name = city.map_or_else(|| TOTAL.to_owned(), |pos| or_total(cell(row, pos)));
        table.push(MetricRow {
            key: GeoKey::new(
                vec![
                    cell(row, country).to_owned(),
                    city_name,
                    geo_type.to_owned(),
                ],
                calendar_day(cell(row, date))?,
            ),
            values: vec![parse_value(CHANGE_COLUMN, cell(row, change))?.map(|fraction| fraction * 100.0)],
        })?;
    }
    Ok(())
}

/// Date part of a date or date-time cell.
fn calendar_day(raw: &str) -> Result<NaiveDate, PortError> {
    NaiveDate::parse_and_remainder(raw, "%Y-%m-%d")
        .or_else(|_err| NaiveDate::parse_and_remainder(raw, "%m/%d/%Y"))
        .map(|(date, _time)| date)
        .map_err(PortError::from)
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta::new(ProviderId::Waze, "Waze COVID-19 local driving trends")
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTRIES: &str = "\
Country,Date,% Change In Waze Driven Miles/KMs
France,2020-03-02 00:00:00,-0.12
Brazil,2020-03-01,0.05
";

    const CITIES: &str = "\
Country,City,Date,% Change In Waze Driven Miles/KMs
France,Paris,2020-03-01,-0.5
France,Lyon,2020-03-01,
";

    fn reports() -> WazeReports {
        WazeReports {
            countries: RawTable::from_reader(COUNTRIES.as_bytes()).expect("valid csv"),
            cities: RawTable::from_reader(CITIES.as_bytes()).expect("valid csv"),
        }
    }

    #[test]
    fn fractions_become_percentages() {
        let table = build_report(&reports()).expect("valid exports");
        let france = table
            .rows()
            .iter()
            .find(|row| row.key.geo == ["France", TOTAL, "country"])
            .expect("country row");
        let value = france.values[0].expect("has value");
        assert!((value - -12.0).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn union_is_tagged_and_sorted() {
        let table = build_report(&reports()).expect("valid exports");
        assert_eq!(table.columns(), ["country", "city", "geo_type", "date", "driving_waze"]);
        let keys: Vec<_> = table
            .rows()
            .iter()
            .map(|row| format!("{}@{}", row.key.geo.join("/"), row.key.date))
            .collect();
        assert_eq!(
            keys,
            [
                "Brazil/Total/country@2020-03-01",
                "France/Lyon/city@2020-03-01",
                "France/Paris/city@2020-03-01",
                "France/Total/country@2020-03-02",
            ]
        );
        assert_eq!(table.rows()[1].values, [None::<f64>]);
    }

    #[test]
    fn unnamed_cities_become_total() {
        let reports = WazeReports {
            countries: RawTable::new(&["Country", "Date", CHANGE_COLUMN]),
            cities: RawTable::from_reader(
                "Country,City,Date,% Change In Waze Driven Miles/KMs\nFrance,,2020-03-01,-0.5\n"
                    .as_bytes(),
            )
            .expect("valid csv"),
        };
        let table = build_report(&reports).expect("valid exports");
        assert_eq!(table.rows()[0].key.geo, ["France", TOTAL, "city"]);
    }

    #[test]
    fn date_times_are_truncated() {
        assert_eq!(
            calendar_day("2020-03-02 13:45:00").expect("date time"),
            NaiveDate::from_ymd_opt(2020, 3, 2).expect("valid date")
        );
        assert_eq!(
            calendar_day("3/2/2020").expect("us date"),
            NaiveDate::from_ymd_opt(2020, 3, 2).expect("valid date")
        );
        assert!(calendar_day("yesterday").is_err(), "not a date");
    }

    #[test]
    fn city_export_requires_city_column() {
        let reports = WazeReports {
            countries: RawTable::from_reader(COUNTRIES.as_bytes()).expect("valid csv"),
            cities: RawTable::from_reader(COUNTRIES.as_bytes()).expect("valid csv"),
        };
        assert!(
            matches!(build_report(&reports), Err(PortError::MissingColumn(name)) if name == "City"),
            "city column is required"
        );
    }

    #[test]
    fn only_the_world_view_exists() {
        let result = WazeNormalizer::new().normalize(&reports(), Granularity::Us);
        assert!(result.is_err(), "waze has no US view");
    }
}
