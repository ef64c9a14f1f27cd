//! Sparse name-translation tables used to reconcile provider naming conventions.

use std::collections::HashMap;
use std::io::Read;

use crate::ports::PortError;
use crate::table::{RawTable, cell};

/// Raw name to canonical name. Only exceptions are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crosswalk {
    entries: HashMap<String, String>,
}

impl Crosswalk {
    /// Build a crosswalk from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(raw, canonical)| (raw.into(), canonical.into()))
                .collect(),
        }
    }

    /// Read a two-column CSV: raw name first, canonical name second. The header row is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Csv`] for malformed input and [`PortError::MissingColumn`]
    /// when the file has fewer than two columns.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PortError> {
        let table = RawTable::from_reader(reader)?;
        if table.headers().len() < 2 {
            return Err(PortError::MissingColumn("canonical name".to_owned()));
        }
        Ok(Self::from_pairs(
            table
                .rows()
                .iter()
                .map(|row| (cell(row, 0).to_owned(), cell(row, 1).to_owned()))
                .filter(|(raw, canonical)| !raw.is_empty() && !canonical.is_empty()),
        ))
    }

    /// Canonical form of `raw_name`; unknown names pass through unchanged.
    #[must_use]
    pub fn translate<'name>(&'name self, raw_name: &'name str) -> &'name str {
        self.entries.get(raw_name).map_or(raw_name, String::as_str)
    }

    /// Number of stored exceptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no exceptions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Translate through an optional crosswalk. An absent table is identity.
#[must_use]
pub fn translate(raw_name: &str, table: Option<&Crosswalk>) -> String {
    table
        .map_or(raw_name, |crosswalk| crosswalk.translate(raw_name))
        .to_owned()
}

/// Country-level and subregion-level crosswalks, applied to their own fields only.
#[derive(Debug, Clone, Default)]
pub struct Crosswalks {
    /// Applied to the country field.
    pub country: Option<Crosswalk>,
    /// Applied to the region field.
    pub subregion: Option<Crosswalk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_pass_through() {
        let crosswalk = Crosswalk::from_pairs([("Czech Republic", "Czechia")]);
        assert_eq!(crosswalk.translate("Czech Republic"), "Czechia");
        assert_eq!(crosswalk.translate("France"), "France");
        assert_eq!(translate("France", Some(&crosswalk)), "France");
    }

    #[test]
    fn absent_table_is_identity() {
        assert_eq!(translate("Republic of Korea", None), "Republic of Korea");
    }

    #[test]
    fn from_reader_uses_first_column_as_key() {
        let csv = "country_apple,country_google\nRepublic of Korea,South Korea\nUK,United Kingdom\n";
        let crosswalk = Crosswalk::from_reader(csv.as_bytes()).expect("valid csv");
        assert_eq!(crosswalk.len(), 2);
        assert_eq!(crosswalk.translate("UK"), "United Kingdom");
    }

    #[test]
    fn from_reader_requires_two_columns() {
        let result = Crosswalk::from_reader("country_apple\nUK\n".as_bytes());
        assert!(matches!(result, Err(PortError::MissingColumn(_))), "single column file");
    }
}
