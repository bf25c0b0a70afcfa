//! Type definitions for tabular data

use crate::error::{ExcelError, Result};
use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Text form used whenever a date/time has to become a string
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Represents a single decoded cell value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CellValue {
    /// Empty cell
    Empty,
    /// String value
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Date/time value
    DateTime(NaiveDateTime),
    /// Formula with the result computed by the application that saved the file.
    ///
    /// The expression keeps its leading `=`; `cached` is never itself a formula.
    /// Build it with [`CellValue::formula`].
    Formula {
        expression: String,
        cached: Box<CellValue>,
    },
}

impl CellValue {
    /// Build a formula cell, normalizing the expression to start with `=`.
    ///
    /// A formula passed as the cached result is collapsed to its own cached value.
    pub fn formula(expression: impl Into<String>, cached: CellValue) -> Self {
        let expression = expression.into();
        let expression = if expression.starts_with('=') {
            expression
        } else {
            format!("={}", expression)
        };
        CellValue::Formula {
            expression,
            cached: Box::new(cached.computed()),
        }
    }

    /// Value as the user sees it: formulas resolve to their cached result
    pub fn computed(self) -> CellValue {
        match self {
            CellValue::Formula { cached, .. } => cached.computed(),
            other => other,
        }
    }

    /// Convert cell value to string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(d) => d.format(DATETIME_FORMAT).to_string(),
            CellValue::Formula { cached, .. } => cached.as_string(),
        }
    }

    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// String, integer and float values; everything else is dropped by export coercion
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            CellValue::String(_) | CellValue::Int(_) | CellValue::Float(_)
        )
    }

    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::String(_) => "string",
            CellValue::Int(_) => "integer",
            CellValue::Float(_) => "float",
            CellValue::Bool(_) => "boolean",
            CellValue::DateTime(_) => "datetime",
            CellValue::Formula { .. } => "formula",
        }
    }

    /// Try to convert to integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) => Some(*f as i64),
            CellValue::String(s) => s.parse().ok(),
            CellValue::Formula { cached, .. } => cached.as_i64(),
            _ => None,
        }
    }

    /// Try to convert to float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::Int(i) => Some(*i as f64),
            CellValue::String(s) => s.parse().ok(),
            CellValue::Formula { cached, .. } => cached.as_f64(),
            _ => None,
        }
    }

    /// Try to convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Int(i) => Some(*i != 0),
            CellValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            CellValue::Formula { cached, .. } => cached.as_bool(),
            _ => None,
        }
    }

    /// Try to read a date/time
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(d) => Some(*d),
            CellValue::String(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok(),
            CellValue::Formula { cached, .. } => cached.as_datetime(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Int(i64::from(i))
    }
}

impl From<u32> for CellValue {
    fn from(i: u32) -> Self {
        CellValue::Int(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(d: NaiveDateTime) -> Self {
        CellValue::DateTime(d)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// Ordered, duplicate-free column names of a table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    names: IndexSet<String>,
}

impl Header {
    /// Build a header, failing on the first duplicate name
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = IndexSet::new();
        for name in names {
            let name = name.into();
            if set.contains(&name) {
                return Err(ExcelError::Format(format!(
                    "duplicate header name '{}'",
                    name
                )));
            }
            set.insert(name);
        }
        Ok(Header { names: set })
    }

    /// Column position of `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(name)
    }

    /// Name of the column at `index`
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get_index(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Header as a row of string cells
    pub fn to_row(&self) -> Row {
        Row::new(
            self.names
                .iter()
                .map(|n| CellValue::String(n.clone()))
                .collect(),
        )
    }
}

/// Represents a row of cells, optionally keyed by column name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Cells in this row
    pub cells: Vec<CellValue>,
    header: Option<Arc<Header>>,
}

impl Row {
    /// Create a positional row
    pub fn new(cells: Vec<CellValue>) -> Self {
        Row {
            cells,
            header: None,
        }
    }

    /// Create a row whose cells are paired positionally with `header`
    pub fn named(header: Arc<Header>, cells: Vec<CellValue>) -> Self {
        Row {
            cells,
            header: Some(header),
        }
    }

    /// Create a named row from `(name, value)` pairs; a repeated name keeps its
    /// first position and its last value, like a map insert.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CellValue>,
    {
        let mut map: IndexMap<String, CellValue> = IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        let names: IndexSet<String> = map.keys().cloned().collect();
        let cells = map.into_values().collect();
        Row::named(Arc::new(Header { names }), cells)
    }

    /// Get cell at column index
    pub fn get(&self, col: usize) -> Option<&CellValue> {
        self.cells.get(col)
    }

    /// Get cell by column name (named rows only)
    pub fn get_by_name(&self, name: &str) -> Option<&CellValue> {
        let idx = self.header.as_ref()?.index_of(name)?;
        self.cells.get(idx)
    }

    /// Header shared by the rows of one sheet, if headers are in effect
    pub fn header(&self) -> Option<&Arc<Header>> {
        self.header.as_ref()
    }

    /// Get number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() || self.cells.iter().all(|c| c.is_empty())
    }

    /// `(name, value)` pairs; positional rows are keyed by their column index
    pub fn entries(&self) -> Vec<(String, &CellValue)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let key = self
                    .header
                    .as_ref()
                    .and_then(|h| h.name(i))
                    .map(str::to_string)
                    .unwrap_or_else(|| i.to_string());
                (key, cell)
            })
            .collect()
    }

    /// Pad with `Empty` or truncate so the row has exactly `width` cells
    pub fn normalize_width(&mut self, width: usize) {
        self.cells.resize(width, CellValue::Empty);
    }

    /// Convert row to vector of strings
    pub fn to_strings(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.as_string()).collect()
    }

    pub fn into_cells(self) -> Vec<CellValue> {
        self.cells
    }
}

/// Conversion of row-like caller data into a [`Row`]
///
/// Implement this for your own record types to export them directly.
pub trait IntoRow {
    fn into_row(self) -> Row;
}

impl IntoRow for Row {
    fn into_row(self) -> Row {
        self
    }
}

impl<V: Into<CellValue>> IntoRow for Vec<V> {
    fn into_row(self) -> Row {
        Row::new(self.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<CellValue>, const N: usize> IntoRow for [V; N] {
    fn into_row(self) -> Row {
        Row::new(self.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<CellValue>, S> IntoRow for IndexMap<K, V, S> {
    fn into_row(self) -> Row {
        Row::from_pairs(self)
    }
}

impl<K: Into<String>, V: Into<CellValue>> IntoRow for BTreeMap<K, V> {
    fn into_row(self) -> Row {
        Row::from_pairs(self)
    }
}

/// Border line weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BorderStyle {
    Thin,
    Medium,
    Thick,
}

/// Formatting applied uniformly to a header row or to all data rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub font_name: Option<String>,
    /// Font size in points
    pub font_size: Option<u16>,
    /// RGB hex, e.g. `"FF0000"`
    pub font_color: Option<String>,
    /// RGB hex, e.g. `"FFFF00"`
    pub background_color: Option<String>,
    /// Same border on all four sides
    pub border: Option<BorderStyle>,
    pub wrap_text: bool,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn font_name(mut self, name: &str) -> Self {
        self.font_name = Some(name.to_string());
        self
    }

    pub fn font_size(mut self, size: u16) -> Self {
        self.font_size = Some(size);
        self
    }

    /// Accepts `"FF0000"` or `"#ff0000"`
    pub fn font_color(mut self, rgb: &str) -> Self {
        self.font_color = Some(normalize_rgb(rgb));
        self
    }

    /// Accepts `"FFFF00"` or `"#ffff00"`
    pub fn background_color(mut self, rgb: &str) -> Self {
        self.background_color = Some(normalize_rgb(rgb));
        self
    }

    pub fn border(mut self, border: BorderStyle) -> Self {
        self.border = Some(border);
        self
    }

    pub fn wrap_text(mut self) -> Self {
        self.wrap_text = true;
        self
    }

    /// Check colour fields; writers call this before registering the style
    pub fn validate(&self) -> Result<()> {
        for color in [&self.font_color, &self.background_color]
            .into_iter()
            .flatten()
        {
            if color.len() != 6 || !color.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ExcelError::Argument(format!(
                    "colour '{}' is not a 6-digit RGB hex value",
                    color
                )));
            }
        }
        Ok(())
    }
}

fn normalize_rgb(rgb: &str) -> String {
    rgb.trim_start_matches('#').to_ascii_uppercase()
}

/// One sheet of an open workbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHandle {
    /// Zero-based position in the workbook
    pub index: usize,
    pub name: String,
}

/// Decimal text for a float. Always carries a `.` or an exponent, so the
/// integer/float distinction survives a trip through a numeric cell.
pub(crate) fn float_text(value: f64) -> String {
    format!("{:?}", value)
}

/// Read numeric cell text back as `Int` or `Float` by its lexical form
pub(crate) fn parse_number(text: &str) -> Option<CellValue> {
    let text = text.trim();
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(i) = text.parse::<i64>() {
            return Some(CellValue::Int(i));
        }
    }
    text.parse::<f64>().ok().map(CellValue::Float)
}

/// Parse ISO 8601 text (`2024-01-31T10:00:00.250`, `2024-01-31`) as used by
/// ODS `date-value` and XLSX `t="d"` cells
pub(crate) fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// ISO 8601 text for a date/time, with fractional seconds only when present
pub(crate) fn iso_datetime(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Convert a zero-based column index to letters (0 -> A, 25 -> Z, 26 -> AA)
pub fn column_letter(col: u32) -> String {
    let mut result = String::new();
    let mut col = col + 1;

    while col > 0 {
        col -= 1;
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }

    result
}

/// Split a cell reference such as `"AB12"` into a zero-based column and a
/// one-based row number. The row part is optional (`"C"` is accepted).
pub fn parse_cell_reference(reference: &str) -> Option<(u32, Option<u32>)> {
    let letters_end = reference
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    if letters_end == 0 {
        return None;
    }
    let mut col: u32 = 0;
    for ch in reference[..letters_end].bytes() {
        col = col
            .checked_mul(26)?
            .checked_add(u32::from(ch.to_ascii_uppercase() - b'A') + 1)?;
    }
    let digits = &reference[letters_end..];
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse().ok()?)
    };
    Some((col - 1, row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_cell_reference() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");

        assert_eq!(parse_cell_reference("A1"), Some((0, Some(1))));
        assert_eq!(parse_cell_reference("aa10"), Some((26, Some(10))));
        assert_eq!(parse_cell_reference("C"), Some((2, None)));
        assert_eq!(parse_cell_reference("12"), None);
        assert_eq!(parse_cell_reference("A1x"), None);
    }

    #[test]
    fn test_cell_value_conversions() {
        let val = CellValue::Int(42);
        assert_eq!(val.as_i64(), Some(42));
        assert_eq!(val.as_f64(), Some(42.0));

        let val = CellValue::String("true".to_string());
        assert_eq!(val.as_bool(), Some(true));

        let when = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(CellValue::DateTime(when).as_string(), "2024-03-09 07:05:00");
        assert_eq!(CellValue::from(None::<i64>), CellValue::Empty);
    }

    #[test]
    fn test_formula_cached_is_never_formula() {
        let inner = CellValue::formula("A1", CellValue::Int(3));
        let outer = CellValue::formula("=B1", inner);
        match outer {
            CellValue::Formula { expression, cached } => {
                assert_eq!(expression, "=B1");
                assert_eq!(*cached, CellValue::Int(3));
            }
            other => panic!("expected formula, got {:?}", other),
        }
        assert_eq!(
            CellValue::formula("=1+1", CellValue::Int(2)).computed(),
            CellValue::Int(2)
        );
    }

    #[test]
    fn test_header_rejects_duplicates() {
        let err = Header::new(["a", "b", "a"]).unwrap_err();
        assert!(err.to_string().contains("duplicate header name 'a'"));

        let header = Header::new(["x", "y"]).unwrap();
        assert_eq!(header.index_of("y"), Some(1));
        assert_eq!(header.name(0), Some("x"));
    }

    #[test]
    fn test_named_row_lookup() {
        let mut map = IndexMap::new();
        map.insert("x", 1i64);
        map.insert("y", 2i64);
        let row = map.into_row();

        assert_eq!(row.get_by_name("y"), Some(&CellValue::Int(2)));
        assert_eq!(
            row.entries(),
            vec![
                ("x".to_string(), &CellValue::Int(1)),
                ("y".to_string(), &CellValue::Int(2))
            ]
        );
    }

    #[test]
    fn test_normalize_width() {
        let mut row = vec![1i64, 2].into_row();
        row.normalize_width(4);
        assert_eq!(row.cells[2..], [CellValue::Empty, CellValue::Empty]);

        row.normalize_width(1);
        assert_eq!(row.cells, vec![CellValue::Int(1)]);
    }

    #[test]
    fn test_number_text_keeps_kind() {
        assert_eq!(float_text(2.0), "2.0");
        assert_eq!(parse_number("2.0"), Some(CellValue::Float(2.0)));
        assert_eq!(parse_number("42"), Some(CellValue::Int(42)));
        assert_eq!(parse_number("1e20"), Some(CellValue::Float(1e20)));
        assert_eq!(parse_number(&float_text(-0.125)), Some(CellValue::Float(-0.125)));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_iso_datetime() {
        let when = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 250)
            .unwrap();
        assert_eq!(iso_datetime(&when), "2024-01-31T10:00:00.250");
        assert_eq!(parse_iso_datetime("2024-01-31T10:00:00.250"), Some(when));
        assert_eq!(
            parse_iso_datetime("2024-01-31"),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_iso_datetime("PT12H"), None);
    }

    #[test]
    fn test_style_validation() {
        assert!(Style::new().font_color("#ff0000").validate().is_ok());
        assert!(Style::new().background_color("red").validate().is_err());
    }
}
