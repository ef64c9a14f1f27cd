//! Static reference data: ISO country codes and catalog keys the ranking API spells differently.

use std::collections::HashMap;
use std::io::Read;

use mobility_core::{
    ports::PortError,
    table::{RawTable, cell},
};

use crate::CatalogCity;

/// ISO 3166 alpha-2 to alpha-3 codes.
#[derive(Debug, Clone, Default)]
pub struct CountryCodes {
    alpha3: HashMap<String, String>,
}

impl CountryCodes {
    /// Build the table from `(alpha2, alpha3)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            alpha3: pairs
                .into_iter()
                .map(|(alpha2, alpha3)| (alpha2.into(), alpha3.into()))
                .collect(),
        }
    }

    /// Read a CSV with `Alpha2` and `Alpha3` columns.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when either column is absent.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PortError> {
        let table = RawTable::from_reader(reader)?;
        let alpha2 = table.column("Alpha2")?;
        let alpha3 = table.column("Alpha3")?;
        Ok(Self::from_pairs(table.rows().iter().map(|row| {
            (cell(row, alpha2).to_owned(), cell(row, alpha3).to_owned())
        })))
    }

    /// Alpha-3 code for an alpha-2 code.
    #[must_use]
    pub fn alpha3(&self, alpha2: &str) -> Option<&str> {
        self.alpha3.get(alpha2).map(String::as_str)
    }
}

/// Catalog keys that differ from the key the ranking API expects.
#[derive(Debug, Clone)]
pub struct KeyExceptions {
    keys: HashMap<String, String>,
}

impl KeyExceptions {
    /// Build the table from `(catalog key, api key)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            keys: pairs
                .into_iter()
                .map(|(catalog, api)| (catalog.into(), api.into()))
                .collect(),
        }
    }

    /// Ranking API key for a catalog key.
    #[must_use]
    pub fn resolve<'key>(&'key self, catalog_key: &'key str) -> &'key str {
        self.keys.get(catalog_key).map_or(catalog_key, String::as_str)
    }
}

impl Default for KeyExceptions {
    fn default() -> Self {
        Self::from_pairs([
            ("birmingham-alabama", "birmingham"),
            ("hamilton-nz", "hamilton"),
            ("london-ontario", "london"),
            ("newcastle-au", "newcastle"),
            ("bengaluru", "bangalore"),
        ])
    }
}

/// Ranking API key of a city: `<ISO3>_<api key>`.
///
/// # Errors
///
/// Returns [`PortError::UnknownCountryCode`] when the city's country has no alpha-3 code.
pub fn api_key(
    city: &CatalogCity,
    codes: &CountryCodes,
    exceptions: &KeyExceptions,
) -> Result<String, PortError> {
    let alpha3 = codes
        .alpha3(&city.country)
        .ok_or_else(|| PortError::UnknownCountryCode(city.country.clone()))?;
    Ok(format!("{alpha3}_{}", exceptions.resolve(&city.key)))
}
