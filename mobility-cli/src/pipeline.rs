//! One step per provider plus the merge, each reading its inputs and writing its reports.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{error, info, warn};

use mobility_core::{
    crosswalk::{Crosswalk, Crosswalks},
    merge::{build_summary, countries_view},
    model::{CanonicalTable, Granularity, ProviderId},
    ports::ProviderNormalizer,
};
use mobility_provider_apple::AppleNormalizer;
use mobility_provider_google::{CountryRegions, GoogleFilters, GoogleNormalizer};
use mobility_provider_tomtom::{
    CountryCodes, KeyExceptions, TomTomClient, TomTomNormalizer, check_update, download,
    merge_with_history, stored_report,
};
use mobility_provider_waze::{WazeNormalizer, WazeReports};

use crate::config::Config;
use crate::files::{read_optional, read_raw, read_reference, write_table};

/// Reports the merge consumes from one provider.
pub(crate) struct ProviderReports {
    pub(crate) regions: CanonicalTable,
    pub(crate) us: CanonicalTable,
}

fn report_path(config: &Config, provider: ProviderId, view: &str) -> PathBuf {
    config.output_dir.join(format!("{provider}_{view}.csv"))
}

fn normalize<N>(
    normalizer: &N,
    input: &N::Input,
    granularity: Granularity,
) -> Result<CanonicalTable>
where
    N: ProviderNormalizer,
{
    normalizer.normalize(input, granularity).with_context(|| {
        format!(
            "failed to build {} report for {granularity}",
            normalizer.provider().name
        )
    })
}

pub(crate) fn run_google(config: &Config) -> Result<ProviderReports> {
    let raw = read_raw(&config.google.raw)?;

    let normalizer = GoogleNormalizer::new(GoogleFilters::default());
    let regions = normalize(&normalizer, &raw, Granularity::Regions)?;
    write_table(&regions, &report_path(config, ProviderId::Google, "regions"))?;
    let us = normalize(&normalizer, &raw, Granularity::Us)?;
    write_table(&us, &report_path(config, ProviderId::Google, "US"))?;

    for slice in &config.google.detailed {
        let normalizer = GoogleNormalizer::new(GoogleFilters {
            countries: Some(slice.countries.clone()),
            ..GoogleFilters::default()
        });
        let report = normalize(&normalizer, &raw, Granularity::RegionsDetailed)?;
        write_table(&report, &report_path(config, ProviderId::Google, &slice.name))?;
    }

    if !config.google.world_regions.is_empty() {
        let country_regions = read_optional(
            config.google.country_regions.as_deref(),
            "country world regions",
            CountryRegions::from_reader,
        )?;
        for slice in &config.google.world_regions {
            let normalizer = GoogleNormalizer::new(GoogleFilters {
                world_regions: Some(slice.regions.clone()),
                country_regions: country_regions.clone(),
                countries: None,
            });
            let report = normalize(&normalizer, &raw, Granularity::WorldRegionsDetailed)?;
            write_table(&report, &report_path(config, ProviderId::Google, &slice.name))?;
        }
    }

    Ok(ProviderReports { regions, us })
}

pub(crate) fn run_apple(config: &Config) -> Result<ProviderReports> {
    let raw = read_raw(&config.apple.raw)?;
    let normalizer = AppleNormalizer::new();

    let regions = normalize(&normalizer, &raw, Granularity::Regions)?;
    write_table(&regions, &report_path(config, ProviderId::Apple, "regions"))?;
    let us = normalize(&normalizer, &raw, Granularity::Us)?;
    write_table(&us, &report_path(config, ProviderId::Apple, "US"))?;

    Ok(ProviderReports { regions, us })
}

pub(crate) fn run_waze(config: &Config) -> Result<()> {
    let reports = WazeReports {
        countries: read_raw(&config.waze.countries)?,
        cities: read_raw(&config.waze.cities)?,
    };
    let report = normalize(&WazeNormalizer::new(), &reports, Granularity::Regions)?;
    write_table(&report, &report_path(config, ProviderId::Waze, "regions"))
}

/// Refresh the TomTom history when the reference city has a new day, or always with `force`.
pub(crate) async fn run_tomtom(config: &Config, client: Client, force: bool) -> Result<()> {
    let settings = &config.tomtom;
    let stored = read_stored_report(&settings.report)?;
    let port = TomTomClient::with_urls(client, &settings.catalog_url, &settings.stats_url);

    if !force {
        let updated = check_update(&port, stored.as_ref(), &settings.check_key)
            .await
            .context("failed to check TomTom for new data")?;
        if !updated {
            info!("TomTom report is up to date");
            return Ok(());
        }
    }

    let codes = read_reference(
        &settings.alpha_codes,
        "country alpha codes",
        CountryCodes::from_reader,
    )?;
    let series = download(&port, &codes, &KeyExceptions::default())
        .await
        .context("failed to download TomTom traffic index")?;
    let fresh = normalize(&TomTomNormalizer::new(), series.as_slice(), Granularity::Regions)?;

    let report = match stored {
        Some(stored) => merge_with_history(stored, fresh, settings.history)
            .context("failed to merge TomTom history")?,
        None => fresh,
    };
    write_table(&report, &settings.report)
}

fn read_stored_report(path: &Path) -> Result<Option<CanonicalTable>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = read_raw(path)?;
    stored_report(&raw)
        .map(Some)
        .with_context(|| format!("failed to read stored report {}", path.display()))
}

/// Summary reports by region, by country and for the US.
pub(crate) fn run_merge(
    config: &Config,
    google: ProviderReports,
    apple: ProviderReports,
) -> Result<()> {
    let crosswalks = Crosswalks {
        country: read_optional(
            config.crosswalk.country.as_deref(),
            "country crosswalk",
            Crosswalk::from_reader,
        )?,
        subregion: read_optional(
            config.crosswalk.subregion.as_deref(),
            "subregion crosswalk",
            Crosswalk::from_reader,
        )?,
    };

    let regions = build_summary(apple.regions, google.regions, &crosswalks, Granularity::Regions)
        .context("failed to merge regions reports")?;
    let us = build_summary(apple.us, google.us, &crosswalks, Granularity::Us)
        .context("failed to merge US reports")?;
    let countries = countries_view(regions.clone()).context("failed to derive countries view")?;

    write_table(&regions, &config.output_dir.join("summary_report_regions.csv"))?;
    write_table(&countries, &config.output_dir.join("summary_report_countries.csv"))?;
    write_table(&us, &config.output_dir.join("summary_report_US.csv"))
}

/// Every provider in turn. A failing provider is logged and skipped; the merge only runs when
/// both Google and Apple succeeded.
pub(crate) async fn run_all(config: &Config, client: Client, force: bool) -> Result<()> {
    let google = isolate(ProviderId::Google, run_google(config));
    let apple = isolate(ProviderId::Apple, run_apple(config));
    isolate(ProviderId::Waze, run_waze(config));
    isolate(ProviderId::TomTom, run_tomtom(config, client, force).await);

    match (google, apple) {
        (Some(google), Some(apple)) => run_merge(config, google, apple),
        _ => {
            warn!("Skipping merge, Google or Apple reports are unavailable");
            Ok(())
        }
    }
}

fn isolate<T>(provider: ProviderId, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(%provider, "Provider failed: {err:#}");
            None
        }
    }
}
