//! Normalizer trait and the error type shared by every provider.

use chrono::ParseError as ChronoParseError;
use csv::Error as CsvError;
use reqwest::Error as ReqwestError;

use crate::model::{CanonicalTable, Granularity, ProviderId, ProviderMeta};

#[derive(thiserror::Error, Debug)]
/// Errors raised while reading, reshaping, merging or acquiring provider data.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Failed to parse a date from a provider export.
    #[error("Parse error: {0}")]
    Parse(#[from] ChronoParseError),
    /// Failed to read a CSV export.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
    /// A raw export lacks a column the transform reads.
    #[error("Missing column: {0}")]
    MissingColumn(String),
    /// A metric cell is neither empty nor a number.
    #[error("Invalid number {value:?} in column {column}")]
    InvalidNumber {
        /// Column holding the cell.
        column: String,
        /// Raw cell content.
        value: String,
    },
    /// A row does not match the width of its table.
    #[error("Row has {found} fields, expected {expected}")]
    RowLength {
        /// Width of the table.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },
    /// Apple export carries a `geo_type` outside the known set.
    #[error("Unknown geo type: {0}")]
    UnknownGeoType(String),
    /// A pivot met a category value that has no output column.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    /// Two rows collapse onto the same key where uniqueness is required.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    /// Two tables that must share a layout do not.
    #[error("Column mismatch: [{left}] vs [{right}]")]
    ColumnMismatch {
        /// Header of the first table.
        left: String,
        /// Header of the second table.
        right: String,
    },
    /// The provider cannot produce the requested granularity.
    #[error("{provider} does not support granularity {granularity}")]
    UnsupportedGranularity {
        /// Provider asked.
        provider: ProviderId,
        /// Granularity requested.
        granularity: Granularity,
    },
    /// Summary reports are only built for world regions and the US.
    #[error("No summary report for granularity {0}")]
    UnsupportedSummary(Granularity),
    /// An ISO-2 country code has no ISO-3 counterpart in the reference table.
    #[error("Unknown country code: {0}")]
    UnknownCountryCode(String),
    /// A remote series used for update detection is empty.
    #[error("Empty series for {0}")]
    EmptySeries(String),
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortError {
    /// Error for a granularity the provider does not produce.
    #[must_use]
    pub fn unsupported(provider: ProviderId, granularity: Granularity) -> Self {
        PortError::UnsupportedGranularity {
            provider,
            granularity,
        }
    }
}

/// Converts one provider's raw export into the canonical long-format schema.
pub trait ProviderNormalizer {
    /// Raw input consumed by this provider.
    type Input: ?Sized;

    /// Metadata describing the provider handled by this normalizer.
    fn provider(&self) -> &ProviderMeta;

    /// Build the canonical table for the requested granularity.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the input misses a required column, holds
    /// unparsable cells, or the granularity is not supported.
    fn normalize(
        &self,
        input: &Self::Input,
        granularity: Granularity,
    ) -> Result<CanonicalTable, PortError>;
}
