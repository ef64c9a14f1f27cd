//! Canonical data structures shared by every provider: geographic keys, metric rows and tables.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ports::PortError;

/// Placeholder used instead of an empty value when no finer subdivision exists.
pub const TOTAL: &str = "Total";

/// Name of the date column in every canonical table.
pub const DATE_COLUMN: &str = "date";

/// Format used for dates in provider exports and written reports.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Data providers known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// Google Community Mobility Reports.
    Google,
    /// Apple Mobility Trends.
    Apple,
    /// Waze local driving trends.
    Waze,
    /// TomTom Traffic Index.
    TomTom,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            ProviderId::Google => "google",
            ProviderId::Apple => "apple",
            ProviderId::Waze => "waze",
            ProviderId::TomTom => "tomtom",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a provider and its human-friendly name.
pub struct ProviderMeta {
    /// Unique identifier.
    pub id: ProviderId,
    /// Display name.
    pub name: String,
}

impl ProviderMeta {
    /// Build metadata for a provider.
    #[must_use]
    pub fn new<S: Into<String>>(id: ProviderId, name: S) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Level of geographic detail requested from a normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// Countries and their first-level subregions.
    Regions,
    /// US states and counties or cities.
    Us,
    /// Every subregion level for a selection of countries.
    RegionsDetailed,
    /// Every subregion level, tagged with the world region of the country.
    WorldRegionsDetailed,
}

impl fmt::Display for Granularity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Granularity::Regions => "regions",
            Granularity::Us => "US",
            Granularity::RegionsDetailed => "regions_detailed",
            Granularity::WorldRegionsDetailed => "world_regions_detailed",
        };
        write!(formatter, "{slug}")
    }
}

impl FromStr for Granularity {
    type Err = PortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "regions" => Ok(Granularity::Regions),
            "US" => Ok(Granularity::Us),
            "regions_detailed" => Ok(Granularity::RegionsDetailed),
            "world_regions_detailed" => Ok(Granularity::WorldRegionsDetailed),
            other => Err(PortError::Internal(format!("unknown granularity {other}"))),
        }
    }
}

/// Geographic identity of a row: the geo columns of its table, finest last, plus the date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeoKey {
    /// One value per geo column of the owning table.
    pub geo: Vec<String>,
    /// Calendar day of the observation.
    pub date: NaiveDate,
}

impl GeoKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(geo: Vec<String>, date: NaiveDate) -> Self {
        Self { geo, date }
    }
}

/// One observation: a key and one optional value per metric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// Geographic identity and date.
    pub key: GeoKey,
    /// Percent change from baseline per metric; `None` when the provider has no data that day.
    pub values: Vec<Option<f64>>,
}

/// Long-format table with a fixed column layout: geo columns, `date`, metric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTable {
    geo_columns: Vec<String>,
    metric_columns: Vec<String>,
    rows: Vec<MetricRow>,
}

impl CanonicalTable {
    /// Create an empty table with the given layout.
    #[must_use]
    pub fn new<G, M>(geo_columns: &[G], metric_columns: &[M]) -> Self
    where
        G: AsRef<str>,
        M: AsRef<str>,
    {
        Self {
            geo_columns: geo_columns.iter().map(|col| col.as_ref().to_owned()).collect(),
            metric_columns: metric_columns
                .iter()
                .map(|col| col.as_ref().to_owned())
                .collect(),
            rows: Vec::new(),
        }
    }

    /// Geo column names, coarsest first.
    #[must_use]
    pub fn geo_columns(&self) -> &[String] {
        &self.geo_columns
    }

    /// Metric column names in output order.
    #[must_use]
    pub fn metric_columns(&self) -> &[String] {
        &self.metric_columns
    }

    /// Full header in output order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.geo_columns
            .iter()
            .cloned()
            .chain(std::iter::once(DATE_COLUMN.to_owned()))
            .chain(self.metric_columns.iter().cloned())
            .collect()
    }

    /// Rows in their current order.
    #[must_use]
    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    /// Consume the table and return its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<MetricRow> {
        self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::RowLength`] when the row does not match the table layout.
    pub fn push(&mut self, row: MetricRow) -> Result<(), PortError> {
        if row.key.geo.len() != self.geo_columns.len() {
            return Err(PortError::RowLength {
                expected: self.geo_columns.len(),
                found: row.key.geo.len(),
            });
        }
        if row.values.len() != self.metric_columns.len() {
            return Err(PortError::RowLength {
                expected: self.metric_columns.len(),
                found: row.values.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append every row of `other`, which must share this table's layout.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::ColumnMismatch`] when the layouts differ.
    pub fn extend(&mut self, other: CanonicalTable) -> Result<(), PortError> {
        if self.geo_columns != other.geo_columns || self.metric_columns != other.metric_columns {
            return Err(PortError::ColumnMismatch {
                left: self.columns().join(","),
                right: other.columns().join(","),
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Stable sort by geo columns in declared order, then date.
    pub fn sort(&mut self) {
        self.rows.sort_by(|left, right| left.key.cmp(&right.key));
    }

    /// Position of a geo column.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when the column is absent.
    pub fn geo_position(&self, name: &str) -> Result<usize, PortError> {
        self.geo_columns
            .iter()
            .position(|col| col == name)
            .ok_or_else(|| PortError::MissingColumn(name.to_owned()))
    }

    /// Rename a geo column.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when `from` is not a geo column.
    pub fn rename_geo_column(&mut self, from: &str, to: &str) -> Result<(), PortError> {
        let pos = self.geo_position(from)?;
        if let Some(col) = self.geo_columns.get_mut(pos) {
            to.clone_into(col);
        }
        Ok(())
    }

    /// Rewrite every value of a geo column with `remap`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when the column is absent.
    pub fn map_geo_column<F>(&mut self, name: &str, mut remap: F) -> Result<(), PortError>
    where
        F: FnMut(&str) -> String,
    {
        let pos = self.geo_position(name)?;
        for row in &mut self.rows {
            if let Some(value) = row.key.geo.get_mut(pos) {
                *value = remap(value);
            }
        }
        Ok(())
    }

    /// Keep only the named geo columns, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when a name is not a geo column.
    pub fn select_geo(self, columns: &[&str]) -> Result<CanonicalTable, PortError> {
        let positions = columns
            .iter()
            .map(|name| self.geo_position(name))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .into_iter()
            .map(|row| MetricRow {
                key: GeoKey::new(
                    positions
                        .iter()
                        .filter_map(|&pos| row.key.geo.get(pos).cloned())
                        .collect(),
                    row.key.date,
                ),
                values: row.values,
            })
            .collect();
        Ok(CanonicalTable {
            geo_columns: columns.iter().map(|&col| col.to_owned()).collect(),
            metric_columns: self.metric_columns,
            rows,
        })
    }

    /// Keep rows whose geo column equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when the column is absent.
    pub fn filter_eq(mut self, column: &str, value: &str) -> Result<CanonicalTable, PortError> {
        let pos = self.geo_position(column)?;
        self.rows
            .retain(|row| row.key.geo.get(pos).is_some_and(|geo| geo == value));
        Ok(self)
    }

    /// Latest date in the table.
    #[must_use]
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|row| row.key.date).max()
    }

    /// Keys that occur more than once, in key order.
    #[must_use]
    pub fn duplicate_keys(&self) -> Vec<&GeoKey> {
        let mut keys: Vec<&GeoKey> = self.rows.iter().map(|row| &row.key).collect();
        keys.sort();
        let mut duplicates: Vec<&GeoKey> = keys
            .windows(2)
            .filter_map(|pair| match pair {
                [first, second] if first == second => Some(*first),
                _ => None,
            })
            .collect();
        duplicates.dedup();
        duplicates
    }

    /// Render every row as strings in header order, with absent metrics as empty cells.
    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            row.key
                .geo
                .iter()
                .cloned()
                .chain(std::iter::once(
                    row.key.date.format(DATE_FORMAT).to_string(),
                ))
                .chain(
                    row.values
                        .iter()
                        .map(|value| value.map(|num| num.to_string()).unwrap_or_default()),
                )
                .collect()
        })
    }
}

/// Treat an empty cell as missing and fall back to [`TOTAL`].
#[must_use]
pub fn or_total(value: &str) -> String {
    if value.is_empty() {
        TOTAL.to_owned()
    } else {
        value.to_owned()
    }
}
