//! Normalizer for the Apple Mobility Trends export: one row per place and transport type, one
//! column per date, values indexed to a baseline of 100.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use mobility_core::{
    model::{CanonicalTable, DATE_COLUMN, Granularity, ProviderId, ProviderMeta, TOTAL},
    ports::{PortError, ProviderNormalizer},
    table::{RawTable, cell, melt, optional_cell, pivot},
};

/// Transport types in output order.
pub const TRANSPORT_TYPES: [&str; 3] = ["driving", "transit", "walking"];

/// Apple's index value that corresponds to no change.
pub const BASELINE: f64 = 100.0;

const GEO_TYPE: &str = "geo_type";
const REGION: &str = "region";
const TRANSPORTATION_TYPE: &str = "transportation_type";
const SUB_REGION: &str = "sub-region";
const COUNTRY: &str = "country";
const ALTERNATIVE_NAME: &str = "alternative_name";
const UNITED_STATES: &str = "United States";

const REGIONS_IDS: [&str; 4] = [COUNTRY, SUB_REGION, "subregion_and_city", GEO_TYPE];
const US_IDS: [&str; 3] = ["state", "county_and_city", GEO_TYPE];

/// Kind of place a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoType {
    /// A country; the row names itself in `region`.
    CountryRegion,
    /// A first-level subregion such as a state.
    SubRegion,
    /// A city.
    City,
    /// A US county.
    County,
}

impl GeoType {
    /// Label used in the export.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GeoType::CountryRegion => "country/region",
            GeoType::SubRegion => "sub-region",
            GeoType::City => "city",
            GeoType::County => "county",
        }
    }
}

impl fmt::Display for GeoType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for GeoType {
    type Err = PortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "country/region" => Ok(GeoType::CountryRegion),
            "sub-region" => Ok(GeoType::SubRegion),
            "city" => Ok(GeoType::City),
            "county" => Ok(GeoType::County),
            other => Err(PortError::UnknownGeoType(other.to_owned())),
        }
    }
}

/// Geographic fields of one export row.
#[derive(Debug, Clone, Copy)]
struct Place<'row> {
    geo_type: GeoType,
    region: &'row str,
    sub_region: &'row str,
    country: &'row str,
}

impl<'row> Place<'row> {
    /// Country rows name themselves in `region`, not in `country`.
    fn country(&self) -> &'row str {
        match self.geo_type {
            GeoType::CountryRegion => self.region,
            GeoType::SubRegion | GeoType::City | GeoType::County => self.country,
        }
    }

    /// `(country, sub-region, subregion_and_city)` for the world view; counties are excluded.
    fn regions_identity(&self) -> Option<[&'row str; 3]> {
        let (sub_region, subregion_and_city) = match self.geo_type {
            GeoType::CountryRegion => (TOTAL, TOTAL),
            GeoType::SubRegion => (self.region, self.region),
            GeoType::City if self.sub_region.is_empty() => (self.region, self.region),
            GeoType::City => (self.sub_region, self.region),
            GeoType::County => return None,
        };
        Some([self.country(), sub_region, subregion_and_city])
    }

    /// `(state, county_and_city)` for the US view; places outside the US are excluded.
    fn us_identity(&self) -> Option<[&'row str; 2]> {
        if self.country() != UNITED_STATES {
            return None;
        }
        let state = match self.sub_region {
            "" => self.region,
            named => named,
        };
        let state = if state == UNITED_STATES { TOTAL } else { state };
        let county_and_city = match self.geo_type {
            GeoType::City | GeoType::County => self.region,
            GeoType::CountryRegion | GeoType::SubRegion => TOTAL,
        };
        Some([state, county_and_city])
    }
}

/// Apple normalizer.
pub struct AppleNormalizer {
    meta: ProviderMeta,
}

impl AppleNormalizer {
    /// Create a new normalizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: provider_meta(),
        }
    }
}

impl Default for AppleNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderNormalizer for AppleNormalizer {
    type Input = RawTable;

    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    fn normalize(
        &self,
        input: &RawTable,
        granularity: Granularity,
    ) -> Result<CanonicalTable, PortError> {
        build_report(input, granularity)
    }
}

/// Build the Apple report for `regions` or `US`.
///
/// Each row's identity is derived from its `geo_type`, the date columns are melted into rows,
/// shifted from the 100-based index to a percent change, and pivoted so that every transport
/// type becomes a column. Rows with no value for any transport type are dropped.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] for a missing identity column,
/// [`PortError::UnknownGeoType`] for an unexpected `geo_type`,
/// [`PortError::DuplicateKey`] when two rows share an identity, date and transport type, and
/// [`PortError::UnsupportedGranularity`] for detailed granularities.
pub fn build_report(raw: &RawTable, granularity: Granularity) -> Result<CanonicalTable, PortError> {
    let id_columns: &[&str] = match granularity {
        Granularity::Regions => &REGIONS_IDS,
        Granularity::Us => &US_IDS,
        other => return Err(PortError::unsupported(ProviderId::Apple, other)),
    };

    let geo_type = raw.column(GEO_TYPE)?;
    let region = raw.column(REGION)?;
    let transportation_type = raw.column(TRANSPORTATION_TYPE)?;
    let sub_region = raw.optional_column(SUB_REGION);
    let country = raw.optional_column(COUNTRY);

    let identity_headers = [
        GEO_TYPE,
        REGION,
        TRANSPORTATION_TYPE,
        ALTERNATIVE_NAME,
        SUB_REGION,
        COUNTRY,
    ];
    let date_columns: Vec<(usize, &str)> = raw
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, header)| !identity_headers.contains(&header.as_str()))
        .map(|(pos, header)| (pos, header.as_str()))
        .collect();

    let derived_headers: Vec<&str> = id_columns
        .iter()
        .copied()
        .chain(std::iter::once(TRANSPORTATION_TYPE))
        .chain(date_columns.iter().map(|&(_, header)| header))
        .collect();
    let mut derived = RawTable::new(&derived_headers);
    let mut skipped = 0_usize;

    for row in raw.rows() {
        let place = Place {
            geo_type: cell(row, geo_type).parse()?,
            region: cell(row, region),
            sub_region: optional_cell(row, sub_region),
            country: optional_cell(row, country),
        };
        let identity: Vec<&str> = match granularity {
            Granularity::Us => match place.us_identity() {
                Some(ids) => ids.to_vec(),
                None => continue,
            },
            _ => match place.regions_identity() {
                Some(ids @ [country, _, _]) if !country.is_empty() => ids.to_vec(),
                Some(_) => {
                    skipped += 1;
                    continue;
                }
                None => continue,
            },
        };

        derived.push_row(
            identity
                .into_iter()
                .chain(std::iter::once(place.geo_type.as_str()))
                .chain(std::iter::once(cell(row, transportation_type)))
                .chain(date_columns.iter().map(|&(pos, _)| cell(row, pos)))
                .map(str::to_owned)
                .collect(),
        )?;
    }
    if skipped > 0 {
        debug!(skipped, "Dropped Apple rows without a country");
    }

    let melt_ids: Vec<&str> = id_columns
        .iter()
        .copied()
        .chain(std::iter::once(TRANSPORTATION_TYPE))
        .collect();
    let dates: Vec<&str> = date_columns.iter().map(|&(_, header)| header).collect();
    let long = melt(&derived, &melt_ids, &dates, DATE_COLUMN)?.map_values(|value| value - BASELINE);

    let pivot_ids: Vec<&str> = id_columns
        .iter()
        .copied()
        .chain(std::iter::once(DATE_COLUMN))
        .collect();
    let mut table = pivot(&long, &pivot_ids, TRANSPORTATION_TYPE, &TRANSPORT_TYPES)?
        .into_canonical(DATE_COLUMN)?;
    table.sort();

    info!(%granularity, rows = table.len(), "Built Apple report");
    Ok(table)
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta::new(ProviderId::Apple, "Apple Mobility Trends")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const EXPORT: &str = "\
geo_type,region,transportation_type,alternative_name,sub-region,country,2020-01-13,2020-01-14
country/region,Albania,driving,,,,100,85
country/region,Albania,walking,,,,100,
city,Tirana,driving,,,Albania,90,
sub-region,Bavaria,driving,Bayern,Bavaria,Germany,110,120
city,Munich,transit,München,Bavaria,Germany,95,96
city,Nowhere,driving,,,,50,50
country/region,United States,driving,,,,100,101
sub-region,California,driving,CA,California,United States,80,81
city,Washington DC,driving,,District of Columbia,United States,70,71
county,Kings County,driving,,New York,United States,60,61
";

    fn export() -> RawTable {
        RawTable::from_reader(EXPORT.as_bytes()).expect("valid csv")
    }

    fn rows(table: &CanonicalTable) -> Vec<String> {
        table
            .rows()
            .iter()
            .map(|row| format!("{}@{}", row.key.geo.join("/"), row.key.date))
            .collect()
    }

    #[test]
    fn regions_derive_identity_from_geo_type() {
        let table = build_report(&export(), Granularity::Regions).expect("valid export");
        assert_eq!(
            table.columns(),
            [
                "country",
                "sub-region",
                "subregion_and_city",
                "geo_type",
                "date",
                "driving",
                "transit",
                "walking"
            ]
        );
        assert_eq!(
            rows(&table),
            [
                "Albania/Tirana/Tirana/city@2020-01-13",
                "Albania/Total/Total/country/region@2020-01-13",
                "Albania/Total/Total/country/region@2020-01-14",
                "Germany/Bavaria/Bavaria/sub-region@2020-01-13",
                "Germany/Bavaria/Bavaria/sub-region@2020-01-14",
                "Germany/Bavaria/Munich/city@2020-01-13",
                "Germany/Bavaria/Munich/city@2020-01-14",
                "United States/California/California/sub-region@2020-01-13",
                "United States/California/California/sub-region@2020-01-14",
                "United States/District of Columbia/Washington DC/city@2020-01-13",
                "United States/District of Columbia/Washington DC/city@2020-01-14",
                "United States/Total/Total/country/region@2020-01-13",
                "United States/Total/Total/country/region@2020-01-14",
            ]
        );
    }

    #[test]
    fn values_are_shifted_to_percent_change() {
        let table = build_report(&export(), Granularity::Regions).expect("valid export");
        let albania: Vec<_> = table
            .rows()
            .iter()
            .filter(|row| row.key.geo[0] == "Albania" && row.key.geo[1] == TOTAL)
            .collect();
        assert_eq!(albania.len(), 2);
        assert_eq!(albania[0].values, [Some(0.0), None, Some(0.0)]);
        assert_eq!(
            albania[1].key.date,
            NaiveDate::from_ymd_opt(2020, 1, 14).expect("valid date")
        );
        assert_eq!(albania[1].values, [Some(-15.0), None, None]);
    }

    #[test]
    fn us_view_keeps_states_cities_and_counties() {
        let table = build_report(&export(), Granularity::Us).expect("valid export");
        assert_eq!(table.geo_columns(), ["state", "county_and_city", "geo_type"]);
        assert_eq!(
            rows(&table)
                .into_iter()
                .filter(|row| row.ends_with("2020-01-13"))
                .collect::<Vec<_>>(),
            [
                "California/Total/sub-region@2020-01-13",
                "District of Columbia/Washington DC/city@2020-01-13",
                "New York/Kings County/county@2020-01-13",
                "Total/Total/country/region@2020-01-13",
            ]
        );
    }

    #[test]
    fn unknown_geo_type_is_fatal() {
        let raw = RawTable::from_reader(
            "geo_type,region,transportation_type,2020-01-13\nplanet,Earth,driving,100\n".as_bytes(),
        )
        .expect("valid csv");
        let result = build_report(&raw, Granularity::Regions);
        assert!(matches!(result, Err(PortError::UnknownGeoType(kind)) if kind == "planet"), "closed set");
    }

    #[test]
    fn detailed_granularity_is_unsupported() {
        let result = build_report(&export(), Granularity::RegionsDetailed);
        assert!(
            matches!(result, Err(PortError::UnsupportedGranularity { provider: ProviderId::Apple, .. })),
            "apple has no detailed view"
        );
    }

    #[test]
    fn place_identity_rules() {
        let city = Place {
            geo_type: GeoType::City,
            region: "Lyon",
            sub_region: "",
            country: "France",
        };
        assert_eq!(city.regions_identity(), Some(["France", "Lyon", "Lyon"]));
        assert_eq!(city.us_identity(), None);

        let county = Place {
            geo_type: GeoType::County,
            region: "Kings County",
            sub_region: "New York",
            country: UNITED_STATES,
        };
        assert_eq!(county.regions_identity(), None);
        assert_eq!(county.us_identity(), Some(["New York", "Kings County"]));
    }
}
