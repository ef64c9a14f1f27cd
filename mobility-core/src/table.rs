//! Raw string tables as read from provider exports, and the melt/pivot reshapes between
//! wide and long layouts.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::ReaderBuilder;

use crate::model::{CanonicalTable, DATE_FORMAT, GeoKey, MetricRow};
use crate::ports::PortError;

/// Header plus string rows. An empty cell is the missing-value marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Create an empty table with the given header.
    #[must_use]
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|col| col.as_ref().to_owned()).collect(),
            rows: Vec::new(),
        }
    }

    /// Read a CSV export whose first row is the header.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Csv`] when the input is not well-formed CSV.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PortError> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr
            .headers()?
            .iter()
            .map(|header| header.trim().to_owned())
            .collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_owned).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Column names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in file order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a data row.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::RowLength`] when the row width differs from the header.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), PortError> {
        if row.len() != self.headers.len() {
            return Err(PortError::RowLength {
                expected: self.headers.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Position of a required column.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when the header lacks `name`.
    pub fn column(&self, name: &str) -> Result<usize, PortError> {
        self.optional_column(name)
            .ok_or_else(|| PortError::MissingColumn(name.to_owned()))
    }

    /// Position of a column that some exports omit.
    #[must_use]
    pub fn optional_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Rewrite every header with `rename`.
    pub fn map_headers<F>(&mut self, rename: F)
    where
        F: FnMut(&str) -> String,
    {
        self.headers = self.headers.iter().map(String::as_str).map(rename).collect();
    }
}

/// Cell content at `index`, or the empty string when the row is short.
#[must_use]
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map_or("", |value| value.trim())
}

/// Cell content of an optional column.
#[must_use]
pub fn optional_cell(row: &[String], index: Option<usize>) -> &str {
    index.map_or("", |pos| cell(row, pos))
}

/// Parse a metric cell; empty means no data.
///
/// # Errors
///
/// Returns [`PortError::InvalidNumber`] when the cell is not a number.
pub fn parse_value(column: &str, raw: &str) -> Result<Option<f64>, PortError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_err| PortError::InvalidNumber {
            column: column.to_owned(),
            value: raw.to_owned(),
        })
}

/// Parse a `YYYY-MM-DD` cell.
///
/// # Errors
///
/// Returns [`PortError::Parse`] when the cell is not a calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, PortError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(PortError::from)
}

/// One record of a long table.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    /// Identity values, one per column of the owning table.
    pub fields: Vec<String>,
    /// Observed value.
    pub value: Option<f64>,
}

/// Row-per-observation table produced by [`melt`].
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    columns: Vec<String>,
    rows: Vec<LongRow>,
}

impl LongTable {
    /// Identity column names; the melted variable column is last.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in melt order.
    #[must_use]
    pub fn rows(&self) -> &[LongRow] {
        &self.rows
    }

    /// Apply `shift` to every present value.
    #[must_use]
    pub fn map_values<F>(mut self, shift: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        for row in &mut self.rows {
            row.value = row.value.map(&shift);
        }
        self
    }

    fn position(&self, name: &str) -> Result<usize, PortError> {
        self.columns
            .iter()
            .position(|col| col == name)
            .ok_or_else(|| PortError::MissingColumn(name.to_owned()))
    }
}

/// Unpivot `value_columns` into rows: every input row yields one record per value column,
/// carrying the id columns, the value column's name under `var_name`, and the parsed value.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] for an unknown column and
/// [`PortError::InvalidNumber`] for a non-numeric value cell.
pub fn melt<S: AsRef<str>>(
    table: &RawTable,
    id_columns: &[&str],
    value_columns: &[S],
    var_name: &str,
) -> Result<LongTable, PortError> {
    let id_positions = id_columns
        .iter()
        .map(|name| table.column(name))
        .collect::<Result<Vec<_>, _>>()?;
    let value_positions = value_columns
        .iter()
        .map(|name| table.column(name.as_ref()).map(|pos| (name.as_ref(), pos)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(table.len() * value_positions.len());
    for (variable, value_pos) in &value_positions {
        for raw in table.rows() {
            let mut fields: Vec<String> = id_positions
                .iter()
                .map(|&pos| cell(raw, pos).to_owned())
                .collect();
            fields.push((*variable).to_owned());
            rows.push(LongRow {
                fields,
                value: parse_value(variable, cell(raw, *value_pos))?,
            });
        }
    }

    let mut columns: Vec<String> = id_columns.iter().map(|&col| col.to_owned()).collect();
    columns.push(var_name.to_owned());
    Ok(LongTable { columns, rows })
}

/// One record of a wide table.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    /// Identity values, one per id column.
    pub ids: Vec<String>,
    /// One value per category column.
    pub values: Vec<Option<f64>>,
}

/// Column-per-category table produced by [`pivot`], sorted by its id columns.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    id_columns: Vec<String>,
    value_columns: Vec<String>,
    rows: Vec<WideRow>,
}

impl WideTable {
    /// Identity column names.
    #[must_use]
    pub fn id_columns(&self) -> &[String] {
        &self.id_columns
    }

    /// Category column names.
    #[must_use]
    pub fn value_columns(&self) -> &[String] {
        &self.value_columns
    }

    /// Records sorted by id.
    #[must_use]
    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    /// Lift the table into canonical form, parsing `date_column` out of the ids.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingColumn`] when `date_column` is not an id column and
    /// [`PortError::Parse`] for an id that is not a date.
    pub fn into_canonical(self, date_column: &str) -> Result<CanonicalTable, PortError> {
        let date_pos = self
            .id_columns
            .iter()
            .position(|col| col == date_column)
            .ok_or_else(|| PortError::MissingColumn(date_column.to_owned()))?;
        let geo_columns: Vec<&String> = self
            .id_columns
            .iter()
            .enumerate()
            .filter_map(|(pos, col)| (pos != date_pos).then_some(col))
            .collect();

        let mut table = CanonicalTable::new(&geo_columns, &self.value_columns);
        for WideRow { mut ids, values } in self.rows {
            if date_pos >= ids.len() {
                return Err(PortError::MissingColumn(date_column.to_owned()));
            }
            let date = parse_date(&ids.remove(date_pos))?;
            table.push(MetricRow {
                key: GeoKey::new(ids, date),
                values,
            })?;
        }
        Ok(table)
    }
}

/// Spread `category_column` into one column per entry of `categories`, one row per distinct
/// tuple of `id_columns`. Rows whose values are all absent are dropped.
///
/// # Errors
///
/// Returns [`PortError::MissingColumn`] for an unknown column,
/// [`PortError::UnknownCategory`] for a category outside `categories`, and
/// [`PortError::DuplicateKey`] when two records share an id tuple and category.
pub fn pivot(
    long: &LongTable,
    id_columns: &[&str],
    category_column: &str,
    categories: &[&str],
) -> Result<WideTable, PortError> {
    let id_positions = id_columns
        .iter()
        .map(|name| long.position(name))
        .collect::<Result<Vec<_>, _>>()?;
    let category_pos = long.position(category_column)?;

    let mut grouped: BTreeMap<Vec<String>, Vec<Option<Option<f64>>>> = BTreeMap::new();
    for row in long.rows() {
        let category = cell(&row.fields, category_pos);
        let slot_pos = categories
            .iter()
            .position(|&known| known == category)
            .ok_or_else(|| PortError::UnknownCategory(category.to_owned()))?;
        let ids: Vec<String> = id_positions
            .iter()
            .map(|&pos| cell(&row.fields, pos).to_owned())
            .collect();
        let slots = grouped
            .entry(ids)
            .or_insert_with(|| vec![None; categories.len()]);
        let Some(slot) = slots.get_mut(slot_pos) else {
            return Err(PortError::UnknownCategory(category.to_owned()));
        };
        if slot.is_some() {
            return Err(PortError::DuplicateKey(format!(
                "{} / {category}",
                row.fields.join(", ")
            )));
        }
        *slot = Some(row.value);
    }

    let rows = grouped
        .into_iter()
        .map(|(ids, slots)| WideRow {
            ids,
            values: slots.into_iter().map(Option::flatten).collect(),
        })
        .filter(|row| row.values.iter().any(Option::is_some))
        .collect();

    Ok(WideTable {
        id_columns: id_columns.iter().map(|&col| col.to_owned()).collect(),
        value_columns: categories.iter().map(|&col| col.to_owned()).collect(),
        rows,
    })
}
