//! Cross-provider merge: full outer join of two canonical tables and the views derived from it.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::crosswalk::{Crosswalks, translate};
use crate::model::{CanonicalTable, GeoKey, Granularity, MetricRow, TOTAL};
use crate::ports::PortError;

/// Literal Apple uses for the district, both as a state and as a city.
pub const WASHINGTON_DC: &str = "Washington DC";

/// State name the district is reported under by Google.
pub const DISTRICT_OF_COLUMBIA: &str = "District of Columbia";

type Side = Vec<Vec<Option<f64>>>;

/// Full outer join on the complete key. Every key of either side appears in the result; the
/// metrics of the side lacking a key are absent. A key present `k` times on the left and `m`
/// times on the right yields `k * m` rows. The result is sorted by key.
///
/// # Errors
///
/// Returns [`PortError::ColumnMismatch`] when the geo columns differ or the metric columns overlap.
pub fn outer_join(
    left: CanonicalTable,
    right: CanonicalTable,
) -> Result<CanonicalTable, PortError> {
    let overlapping = left
        .metric_columns()
        .iter()
        .any(|col| right.metric_columns().contains(col));
    if left.geo_columns() != right.geo_columns() || overlapping {
        return Err(PortError::ColumnMismatch {
            left: left.columns().join(","),
            right: right.columns().join(","),
        });
    }

    let metric_columns: Vec<String> = left
        .metric_columns()
        .iter()
        .chain(right.metric_columns())
        .cloned()
        .collect();
    let mut joined = CanonicalTable::new(left.geo_columns(), &metric_columns);
    let left_width = left.metric_columns().len();
    let right_width = right.metric_columns().len();

    let mut grouped: BTreeMap<GeoKey, (Side, Side)> = BTreeMap::new();
    for row in left.into_rows() {
        grouped.entry(row.key).or_default().0.push(row.values);
    }
    for row in right.into_rows() {
        grouped.entry(row.key).or_default().1.push(row.values);
    }

    for (key, (mut lefts, mut rights)) in grouped {
        if lefts.len() > 1 || rights.len() > 1 {
            debug!(
                geo = ?key.geo,
                date = %key.date,
                left = lefts.len(),
                right = rights.len(),
                "Repeated join key"
            );
        }
        if lefts.is_empty() {
            lefts.push(vec![None; left_width]);
        }
        if rights.is_empty() {
            rights.push(vec![None; right_width]);
        }
        for left_values in &lefts {
            for right_values in &rights {
                joined.push(MetricRow {
                    key: key.clone(),
                    values: left_values.iter().chain(right_values).copied().collect(),
                })?;
            }
        }
    }

    Ok(joined)
}

/// Merge the Apple and Google canonical tables into one summary table.
///
/// `regions` joins on `(country, region, date)` after translating Apple names through the
/// crosswalks; `US` joins on `(state, county_and_city, date)` after remapping Washington DC.
/// Google metrics come first, then Apple's.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] when either table lacks a key column and
/// [`PortError::UnsupportedSummary`] for other granularities.
pub fn build_summary(
    apple: CanonicalTable,
    google: CanonicalTable,
    crosswalks: &Crosswalks,
    granularity: Granularity,
) -> Result<CanonicalTable, PortError> {
    let (apple, google) = match granularity {
        Granularity::Regions => {
            let mut apple = apple;
            apple.rename_geo_column("subregion_and_city", "region")?;
            let mut apple = apple.select_geo(&["country", "region"])?;
            apple.map_geo_column("country", |name| {
                translate(name, crosswalks.country.as_ref())
            })?;
            apple.map_geo_column("region", |name| {
                translate(name, crosswalks.subregion.as_ref())
            })?;
            (apple, google.select_geo(&["country", "region"])?)
        }
        Granularity::Us => {
            let mut apple = apple.select_geo(&["state", "county_and_city"])?;
            remap_washington_dc(&mut apple)?;
            let mut google = google;
            google.rename_geo_column("county", "county_and_city")?;
            (apple, google.select_geo(&["state", "county_and_city"])?)
        }
        other => return Err(PortError::UnsupportedSummary(other)),
    };

    let apple_rows = apple.len();
    let google_rows = google.len();
    let summary = outer_join(google, apple)?;
    info!(
        %granularity,
        apple_rows,
        google_rows,
        summary_rows = summary.len(),
        "Built summary report"
    );
    Ok(summary)
}

/// Report the district as its own state total: exact `Washington DC` becomes
/// `District of Columbia` in `state` and `Total` in `county_and_city`.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] when either column is absent.
pub fn remap_washington_dc(table: &mut CanonicalTable) -> Result<(), PortError> {
    table.map_geo_column("state", |state| {
        if state == WASHINGTON_DC {
            DISTRICT_OF_COLUMBIA.to_owned()
        } else {
            state.to_owned()
        }
    })?;
    table.map_geo_column("county_and_city", |place| {
        if place == WASHINGTON_DC {
            TOTAL.to_owned()
        } else {
            place.to_owned()
        }
    })
}

/// Country-level view of a `regions` summary: rows with `region == "Total"`, `region` dropped.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] when the summary has no `region` column.
pub fn countries_view(summary: CanonicalTable) -> Result<CanonicalTable, PortError> {
    let remaining: Vec<String> = summary
        .geo_columns()
        .iter()
        .filter(|col| col.as_str() != "region")
        .cloned()
        .collect();
    let remaining: Vec<&str> = remaining.iter().map(String::as_str).collect();
    summary.filter_eq("region", TOTAL)?.select_geo(&remaining)
}
