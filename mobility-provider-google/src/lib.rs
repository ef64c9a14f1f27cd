//! Normalizer for the Google Community Mobility Reports export.

use std::collections::HashMap;
use std::io::Read;

use tracing::{info, warn};

use mobility_core::{
    model::{CanonicalTable, GeoKey, Granularity, MetricRow, ProviderId, ProviderMeta, TOTAL, or_total},
    ports::{PortError, ProviderNormalizer},
    table::{RawTable, cell, parse_date, parse_value},
};

const VALUE_SUFFIX: &str = "_percent_change_from_baseline";

/// Mobility metrics in output order, after header normalization.
pub const METRICS: [&str; 6] = [
    "retail and recreation",
    "grocery and pharmacy",
    "parks",
    "transit stations",
    "workplaces",
    "residential",
];

const COUNTRY: &str = "country";
const SUB_REGION_1: &str = "sub region 1";
const SUB_REGION_2: &str = "sub region 2";
const METRO_AREA: &str = "metro area";
const WORLD_REGION: &str = "world_region";
const UNITED_STATES: &str = "United States";

/// Shorten a raw Google header: drop the percent-change suffix, turn underscores into spaces
/// and call `country region` simply `country`.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    let header = raw.replace(VALUE_SUFFIX, "").replace('_', " ");
    if header == "country region" {
        COUNTRY.to_owned()
    } else {
        header
    }
}

/// Country to world-region lookup (`country`, `world_region` columns).
#[derive(Debug, Clone, Default)]
pub struct CountryRegions {
    regions: HashMap<String, String>,
}

impl CountryRegions {
    /// Build a lookup from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            regions: pairs
                .into_iter()
                .map(|(country, region)| (country.into(), region.into()))
                .collect(),
        }
    }

    /// Read the lookup from CSV.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when `country` or `world_region` is absent.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PortError> {
        let table = RawTable::from_reader(reader)?;
        let country = table.column(COUNTRY)?;
        let region = table.column(WORLD_REGION)?;
        Ok(Self::from_pairs(table.rows().iter().map(|row| {
            (cell(row, country).to_owned(), cell(row, region).to_owned())
        })))
    }

    /// World region of a country.
    #[must_use]
    pub fn region_of(&self, country: &str) -> Option<&str> {
        self.regions.get(country).map(String::as_str)
    }
}

/// Selection applied to the detailed granularities.
#[derive(Debug, Clone, Default)]
pub struct GoogleFilters {
    /// Countries kept by `regions_detailed`; `None` keeps all.
    pub countries: Option<Vec<String>>,
    /// World regions kept by `world_regions_detailed`; `None` keeps all.
    pub world_regions: Option<Vec<String>>,
    /// Lookup joined by `world_regions_detailed`; `None` tags every row with `Total`.
    pub country_regions: Option<CountryRegions>,
}

/// Google normalizer.
pub struct GoogleNormalizer {
    meta: ProviderMeta,
    filters: GoogleFilters,
}

impl GoogleNormalizer {
    /// Create a normalizer using the given detailed-report filters.
    #[must_use]
    pub fn new(filters: GoogleFilters) -> Self {
        Self {
            meta: provider_meta(),
            filters,
        }
    }
}

impl ProviderNormalizer for GoogleNormalizer {
    type Input = RawTable;

    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    fn normalize(
        &self,
        input: &RawTable,
        granularity: Granularity,
    ) -> Result<CanonicalTable, PortError> {
        build_report(input, granularity, &self.filters)
    }
}

/// Build the Google report for a granularity.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] when the export lacks a column the granularity reads,
/// and parse errors for malformed dates or values.
pub fn build_report(
    raw: &RawTable,
    granularity: Granularity,
    filters: &GoogleFilters,
) -> Result<CanonicalTable, PortError> {
    let mut google = raw.clone();
    google.map_headers(normalize_header);

    let columns = Columns::locate(&google)?;
    let table = match granularity {
        Granularity::Regions => regions(&google, &columns)?,
        Granularity::Us => us(&google, &columns)?,
        Granularity::RegionsDetailed => {
            detailed(&google, &columns, filters.countries.as_deref(), None)?
        }
        Granularity::WorldRegionsDetailed => {
            detailed(&google, &columns, None, Some(filters))?
        }
    };

    info!(%granularity, rows = table.len(), "Built Google report");
    Ok(table)
}

struct Columns {
    country: usize,
    date: usize,
    metrics: Vec<usize>,
    sub_region_1: Option<usize>,
    sub_region_2: Option<usize>,
    metro_area: Option<usize>,
}

impl Columns {
    fn locate(table: &RawTable) -> Result<Self, PortError> {
        Ok(Self {
            country: table.column(COUNTRY)?,
            date: table.column("date")?,
            metrics: METRICS
                .iter()
                .map(|name| table.column(name))
                .collect::<Result<_, _>>()?,
            sub_region_1: table.optional_column(SUB_REGION_1),
            sub_region_2: table.optional_column(SUB_REGION_2),
            metro_area: table.optional_column(METRO_AREA),
        })
    }

    fn required(position: Option<usize>, name: &str) -> Result<usize, PortError> {
        position.ok_or_else(|| PortError::MissingColumn(name.to_owned()))
    }

    fn metric_row(&self, raw: &[String], geo: Vec<String>) -> Result<MetricRow, PortError> {
        let values = self
            .metrics
            .iter()
            .zip(METRICS)
            .map(|(&pos, name)| parse_value(name, cell(raw, pos)))
            .collect::<Result<_, _>>()?;
        Ok(MetricRow {
            key: GeoKey::new(geo, parse_date(cell(raw, self.date))?),
            values,
        })
    }
}

fn regions(google: &RawTable, columns: &Columns) -> Result<CanonicalTable, PortError> {
    let sub_region_1 = Columns::required(columns.sub_region_1, SUB_REGION_1)?;
    let sub_region_2 = Columns::required(columns.sub_region_2, SUB_REGION_2)?;
    let metro_area = Columns::required(columns.metro_area, METRO_AREA)?;

    let mut table = CanonicalTable::new(&[COUNTRY, "region"], &METRICS);
    // Second-level subregions and metro areas would double count at this level.
    for raw in google
        .rows()
        .iter()
        .filter(|raw| cell(raw, sub_region_2).is_empty() && cell(raw, metro_area).is_empty())
    {
        let geo = vec![
            cell(raw, columns.country).to_owned(),
            or_total(cell(raw, sub_region_1)),
        ];
        table.push(columns.metric_row(raw, geo)?)?;
    }
    Ok(table)
}

fn us(google: &RawTable, columns: &Columns) -> Result<CanonicalTable, PortError> {
    let sub_region_1 = Columns::required(columns.sub_region_1, SUB_REGION_1)?;
    let sub_region_2 = Columns::required(columns.sub_region_2, SUB_REGION_2)?;

    let mut table = CanonicalTable::new(&["state", "county"], &METRICS);
    for raw in google
        .rows()
        .iter()
        .filter(|raw| cell(raw, columns.country) == UNITED_STATES)
    {
        let geo = vec![
            or_total(cell(raw, sub_region_1)),
            or_total(cell(raw, sub_region_2)),
        ];
        table.push(columns.metric_row(raw, geo)?)?;
    }
    Ok(table)
}

fn detailed(
    google: &RawTable,
    columns: &Columns,
    countries: Option<&[String]>,
    world: Option<&GoogleFilters>,
) -> Result<CanonicalTable, PortError> {
    let sub_region_1 = Columns::required(columns.sub_region_1, SUB_REGION_1)?;
    let sub_region_2 = Columns::required(columns.sub_region_2, SUB_REGION_2)?;
    let metro_area = Columns::required(columns.metro_area, METRO_AREA)?;

    let geo_columns: &[&str] = if world.is_some() {
        &[WORLD_REGION, COUNTRY, SUB_REGION_1, SUB_REGION_2]
    } else {
        &[COUNTRY, SUB_REGION_1, SUB_REGION_2]
    };
    let lookup = world.and_then(|filters| filters.country_regions.as_ref());
    if world.is_some() && lookup.is_none() {
        warn!("No country to world region lookup, world_region defaults to Total");
    }
    let world_regions = world
        .filter(|_| lookup.is_some())
        .and_then(|filters| filters.world_regions.as_deref());

    let mut table = CanonicalTable::new(geo_columns, &METRICS);
    for raw in google.rows() {
        let country = cell(raw, columns.country);
        if countries.is_some_and(|kept| !kept.iter().any(|name| name == country)) {
            continue;
        }

        let mut geo = Vec::with_capacity(geo_columns.len());
        if world.is_some() {
            let world_region = match lookup {
                Some(lookup) => match lookup.region_of(country) {
                    Some(region) => region,
                    // Countries without a world region fall out of the join.
                    None => continue,
                },
                None => TOTAL,
            };
            if world_regions.is_some_and(|kept| !kept.iter().any(|name| name == world_region)) {
                continue;
            }
            geo.push(world_region.to_owned());
        }

        // Metro rows stand in for a first-level subregion when none is given.
        let first_level = match cell(raw, sub_region_1) {
            "" => cell(raw, metro_area),
            named => named,
        };
        geo.push(country.to_owned());
        geo.push(or_total(first_level));
        geo.push(or_total(cell(raw, sub_region_2)));
        table.push(columns.metric_row(raw, geo)?)?;
    }
    Ok(table)
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta::new(ProviderId::Google, "Google Community Mobility Reports")
}
