//! Table shaping between sheets and caller data
//!
//! On import, [`ImportShaper`] turns the physical rows of one sheet into
//! records: rows before `start_row` are skipped, the header is captured,
//! blank data rows are dropped, data rows are normalized to the header width,
//! named, filtered through the caller's callback and, if asked, pivoted.
//!
//! On export, [`ExportShaper`] runs the inverse: an optional pivot of the
//! whole table, then per row the callback, value coercion, a header row from
//! the first record's names and alignment by name.

use crate::config::TableOptions;
use crate::error::Result;
use crate::types::{CellValue, Header, Row, Style};
use crate::writer::SheetWriter;
use indexmap::IndexMap;
use log::{debug, trace, warn};
use std::sync::Arc;

/// Per-row callback; returning `None` drops the row
pub type RowCallback<'a> = dyn FnMut(Row) -> Option<Row> + 'a;

/// Imported contents of one sheet
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    /// Records in sheet order; named when headers are in effect
    Rows(Vec<Row>),
    /// Transposed import with headers: column name to the column's values
    Columns(IndexMap<String, Vec<CellValue>>),
}

impl Table {
    /// Number of records, or of columns for a transposed table
    pub fn len(&self) -> usize {
        match self {
            Table::Rows(rows) => rows.len(),
            Table::Columns(columns) => columns.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Table::Rows(rows) => Some(rows),
            Table::Columns(_) => None,
        }
    }

    pub fn columns(&self) -> Option<&IndexMap<String, Vec<CellValue>>> {
        match self {
            Table::Columns(columns) => Some(columns),
            Table::Rows(_) => None,
        }
    }

    /// Records of the table; a column table yields one named row per column
    /// holding the column's values keyed by row position
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Table::Rows(rows) => rows,
            Table::Columns(columns) => columns
                .into_values()
                .map(|values| {
                    Row::from_pairs(
                        values
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (i.to_string(), v)),
                    )
                })
                .collect(),
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::Rows(Vec::new())
    }
}

/// Swap rows and columns; short rows are padded with `Empty`
pub fn transpose(rows: &[Vec<CellValue>]) -> Vec<Vec<CellValue>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            rows.iter()
                .map(|row| row.get(col).cloned().unwrap_or(CellValue::Empty))
                .collect()
        })
        .collect()
}

/// Header names from a captured row: values as text, dates as
/// `YYYY-MM-DD HH:MM:SS`
///
/// Trailing blank cells are not columns; data past the last named column is
/// truncated with the rest of the row.
fn header_from_row(row: Row) -> Result<Header> {
    let mut cells = row.into_cells();
    let width = cells.len();
    while cells.last().is_some_and(CellValue::is_empty) {
        cells.pop();
    }
    if cells.len() < width {
        debug!(
            "header narrowed from {} to {} column(s) by trailing blank cells",
            width,
            cells.len()
        );
    }
    Header::new(cells.into_iter().map(|c| c.computed().as_string()))
}

/// Read-path state machine for one sheet
pub struct ImportShaper<'a, 'c> {
    options: &'a TableOptions,
    callback: Option<&'a mut RowCallback<'c>>,
    header: Option<Arc<Header>>,
    index: usize,
    rows: Vec<Row>,
}

impl<'a, 'c> ImportShaper<'a, 'c> {
    pub fn new(options: &'a TableOptions, callback: Option<&'a mut RowCallback<'c>>) -> Self {
        ImportShaper {
            options,
            callback,
            header: None,
            index: 0,
            rows: Vec::new(),
        }
    }

    /// Feed the next physical row of the sheet
    pub fn push(&mut self, row: Row) -> Result<()> {
        let k = self.index;
        self.index += 1;

        if k < self.options.start_row {
            trace!("row {} skipped before start row", k);
            return Ok(());
        }
        if self.options.with_header && k == self.options.start_row {
            let header = header_from_row(row)?;
            debug!("header captured at row {}: {} column(s)", k, header.len());
            self.header = Some(Arc::new(header));
            return Ok(());
        }

        let cells: Vec<CellValue> = row
            .into_cells()
            .into_iter()
            .map(CellValue::computed)
            .collect();
        if cells.iter().all(CellValue::is_empty) {
            trace!("blank row {} skipped", k);
            return Ok(());
        }
        let row = match &self.header {
            Some(header) => {
                let mut row = Row::named(Arc::clone(header), cells);
                row.normalize_width(header.len());
                row
            }
            None => Row::new(cells),
        };

        let row = match self.callback.as_deref_mut() {
            Some(callback) => match callback(row) {
                Some(row) => row,
                None => {
                    trace!("row {} dropped by callback", k);
                    return Ok(());
                }
            },
            None => row,
        };
        self.rows.push(row);
        Ok(())
    }

    /// Header captured so far
    pub fn header(&self) -> Option<&Arc<Header>> {
        self.header.as_ref()
    }

    pub fn finish(self) -> Table {
        if !self.options.transpose {
            return Table::Rows(self.rows);
        }

        if self.options.with_header {
            let total = self.rows.len();
            let mut columns: IndexMap<String, Vec<CellValue>> = IndexMap::new();
            for (r, row) in self.rows.iter().enumerate() {
                for (name, value) in row.entries() {
                    let column = columns.entry(name).or_default();
                    column.resize(r, CellValue::Empty);
                    column.push(value.clone());
                }
            }
            for column in columns.values_mut() {
                column.resize(total, CellValue::Empty);
            }
            debug!("transposed {} row(s) into {} column(s)", total, columns.len());
            return Table::Columns(columns);
        }

        let cells: Vec<Vec<CellValue>> = self.rows.into_iter().map(Row::into_cells).collect();
        Table::Rows(transpose(&cells).into_iter().map(Row::new).collect())
    }
}

/// Null becomes an empty string; anything but text and numbers is dropped
fn coerce(row: Row) -> Row {
    let dropped = row.cells.iter().any(|c| !c.is_empty() && !c.is_scalar());
    let fill = |cell: &CellValue| match cell {
        CellValue::Empty => Some(CellValue::String(String::new())),
        c if c.is_scalar() => Some(c.clone()),
        other => {
            warn!("{} value dropped from exported row", other.type_name());
            None
        }
    };

    if !dropped {
        let header = row.header().cloned();
        let cells = row
            .cells
            .into_iter()
            .map(|c| match c {
                CellValue::Empty => CellValue::String(String::new()),
                c => c,
            })
            .collect();
        return match header {
            Some(header) => Row::named(header, cells),
            None => Row::new(cells),
        };
    }

    match row.header() {
        Some(_) => Row::from_pairs(
            row.entries()
                .into_iter()
                .filter_map(|(name, cell)| fill(cell).map(|c| (name, c))),
        ),
        None => Row::new(row.cells.iter().filter_map(fill).collect()),
    }
}

/// Cells of `row` in the order of `header`
fn align(row: Row, header: &Header) -> Vec<CellValue> {
    let Some(own) = row.header().cloned() else {
        let mut cells = row.into_cells();
        cells.resize(header.len(), CellValue::Empty);
        return cells;
    };
    if *own == *header {
        return row.into_cells();
    }
    for name in own.names().filter(|n| header.index_of(n).is_none()) {
        warn!("column '{}' is not in the header and was not exported", name);
    }
    header
        .names()
        .map(|name| row.get_by_name(name).cloned().unwrap_or(CellValue::Empty))
        .collect()
}

/// Write-path shaping for one sheet
pub struct ExportShaper<'a, 'c> {
    options: &'a TableOptions,
    header_style: Option<&'a Style>,
    rows_style: Option<&'a Style>,
    callback: Option<&'a mut RowCallback<'c>>,
    header: Option<Arc<Header>>,
    first: bool,
    pending: Vec<Row>,
    written: u64,
}

impl<'a, 'c> ExportShaper<'a, 'c> {
    pub fn new(
        options: &'a TableOptions,
        header_style: Option<&'a Style>,
        rows_style: Option<&'a Style>,
        callback: Option<&'a mut RowCallback<'c>>,
    ) -> Self {
        ExportShaper {
            options,
            header_style,
            rows_style,
            callback,
            header: None,
            first: true,
            pending: Vec::new(),
            written: 0,
        }
    }

    /// Shape one record and write it, or hold it back when transposing
    pub fn push(&mut self, row: Row, writer: &mut dyn SheetWriter) -> Result<()> {
        if self.options.transpose {
            self.pending.push(row);
            return Ok(());
        }
        self.emit(row, writer)
    }

    fn emit(&mut self, row: Row, writer: &mut dyn SheetWriter) -> Result<()> {
        let row = match self.callback.as_deref_mut() {
            Some(callback) => match callback(row) {
                Some(row) => row,
                None => {
                    trace!("export row dropped by callback");
                    return Ok(());
                }
            },
            None => row,
        };
        self.write(coerce(row), writer)
    }

    fn write(&mut self, row: Row, writer: &mut dyn SheetWriter) -> Result<()> {
        if self.first {
            self.first = false;
            if self.options.with_header {
                if let Some(header) = row.header() {
                    writer.add_row(&header.to_row(), self.header_style)?;
                    self.header = Some(Arc::clone(header));
                }
            }
        }

        let cells = match &self.header {
            Some(header) => align(row, header),
            None => row.into_cells(),
        };
        writer.add_row(&Row::new(cells), self.rows_style)?;
        self.written += 1;
        Ok(())
    }

    /// Flush held-back rows; returns the number of data rows written
    pub fn finish(mut self, writer: &mut dyn SheetWriter) -> Result<u64> {
        if !self.options.transpose {
            return Ok(self.written);
        }

        let records = std::mem::take(&mut self.pending);
        let pivoted = pivot(&records)?;
        debug!(
            "pivoted {} record(s) into {} row(s)",
            records.len(),
            pivoted.len()
        );
        for row in pivoted {
            self.emit(row, writer)?;
        }
        Ok(self.written)
    }
}

/// One row per source column, keyed by source row position
///
/// Columns are taken in first-seen order; a record without a column leaves
/// an `Empty` at its position.
fn pivot(records: &[Row]) -> Result<Vec<Row>> {
    let mut columns: IndexMap<String, Vec<CellValue>> = IndexMap::new();
    for (r, record) in records.iter().enumerate() {
        for (name, value) in record.entries() {
            let column = columns.entry(name).or_default();
            column.resize(r, CellValue::Empty);
            column.push(value.clone());
        }
    }
    let positions = Arc::new(Header::new((0..records.len()).map(|i| i.to_string()))?);
    Ok(columns
        .into_values()
        .map(|mut values| {
            values.resize(records.len(), CellValue::Empty);
            Row::named(Arc::clone(&positions), values)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn row(values: &[&str]) -> Row {
        Row::new(values.iter().map(|v| CellValue::from(*v)).collect())
    }

    fn import(options: &TableOptions, rows: Vec<Row>) -> Table {
        let mut shaper = ImportShaper::new(options, None);
        for r in rows {
            shaper.push(r).unwrap();
        }
        shaper.finish()
    }

    /// Rows handed to a writer, for checking export shaping without a file
    #[derive(Default)]
    struct Recorder {
        rows: Vec<(Vec<CellValue>, Option<Style>)>,
    }

    impl SheetWriter for Recorder {
        fn format(&self) -> Format {
            Format::Csv
        }
        fn add_sheet(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn add_row(&mut self, row: &Row, style: Option<&Style>) -> Result<()> {
            self.rows.push((row.cells.clone(), style.cloned()));
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            false
        }
    }

    fn export(options: &TableOptions, rows: Vec<Row>) -> Vec<Vec<String>> {
        let mut recorder = Recorder::default();
        let mut shaper = ExportShaper::new(options, None, None, None);
        for r in rows {
            shaper.push(r, &mut recorder).unwrap();
        }
        shaper.finish(&mut recorder).unwrap();
        recorder
            .rows
            .into_iter()
            .map(|(cells, _)| cells.iter().map(CellValue::as_string).collect())
            .collect()
    }

    #[test]
    fn test_header_and_width_normalization() {
        let table = import(
            &TableOptions::default(),
            vec![
                row(&["a", "b", "c"]),
                row(&["1"]),
                row(&["1", "2", "3", "4", "5"]),
            ],
        );
        let rows = table.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].cells,
            vec![CellValue::from("1"), CellValue::Empty, CellValue::Empty]
        );
        assert_eq!(rows[1].len(), 3);
        assert_eq!(rows[1].get_by_name("c"), Some(&CellValue::from("3")));
    }

    #[test]
    fn test_start_row_skips_physical_rows() {
        let options = TableOptions {
            start_row: 2,
            ..TableOptions::default()
        };
        let table = import(
            &options,
            vec![
                row(&["title"]),
                Row::default(),
                row(&["x", "y"]),
                row(&["1", "2"]),
            ],
        );
        let rows = table.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("y"), Some(&CellValue::from("2")));
    }

    #[test]
    fn test_blank_data_rows_skipped() {
        let table = import(
            &TableOptions::default(),
            vec![
                row(&["a", "b"]),
                row(&["1", "2"]),
                Row::default(),
                Row::new(vec![CellValue::Empty, CellValue::Empty]),
                row(&["3", "4"]),
                Row::default(),
            ],
        );
        let rows: Vec<Vec<String>> = table.rows().unwrap().iter().map(Row::to_strings).collect();
        assert_eq!(rows, vec![vec!["1", "2"], vec!["3", "4"]]);

        let options = TableOptions {
            with_header: false,
            ..TableOptions::default()
        };
        let table = import(&options, vec![Row::default(), row(&["x"]), Row::default()]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_trailing_blank_header_cells_narrow_rows() {
        let table = import(
            &TableOptions::default(),
            vec![
                Row::new(vec!["a".into(), "b".into(), CellValue::Empty, CellValue::Empty]),
                row(&["1", "2", "3"]),
            ],
        );
        let rows = table.rows().unwrap();
        assert_eq!(rows[0].header().unwrap().len(), 2);
        assert_eq!(rows[0].to_strings(), vec!["1", "2"]);
    }

    #[test]
    fn test_header_text_and_duplicates() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let header = header_from_row(Row::new(vec![
            CellValue::DateTime(date),
            CellValue::Int(7),
            CellValue::formula("=1+1", CellValue::Int(2)),
            CellValue::Empty,
        ]))
        .unwrap();
        assert_eq!(
            header.names().collect::<Vec<_>>(),
            vec!["2024-03-01 08:00:00", "7", "2"]
        );

        let options = TableOptions::default();
        let mut shaper = ImportShaper::new(&options, None);
        assert!(shaper.push(row(&["id", "id"])).is_err());
    }

    #[test]
    fn test_formulas_flattened_and_callback_filters() {
        let options = TableOptions::default();
        let mut callback = |r: Row| {
            if r.get_by_name("x") == Some(&CellValue::Int(1)) {
                None
            } else {
                Some(r)
            }
        };
        let mut shaper = ImportShaper::new(&options, Some(&mut callback));
        shaper.push(row(&["x"])).unwrap();
        shaper
            .push(Row::new(vec![CellValue::formula("=A9", CellValue::Int(1))]))
            .unwrap();
        shaper.push(Row::new(vec![CellValue::Int(3)])).unwrap();
        let table = shaper.finish();
        assert_eq!(table.rows().unwrap()[0].cells, vec![CellValue::Int(3)]);
    }

    #[test]
    fn test_transposed_import() {
        let options = TableOptions {
            transpose: true,
            ..TableOptions::default()
        };
        let table = import(&options, vec![row(&["a", "b"]), row(&["1", "2"]), row(&["3"])]);
        let columns = table.columns().unwrap();
        assert_eq!(
            columns["a"],
            vec![CellValue::from("1"), CellValue::from("3")]
        );
        assert_eq!(columns["b"], vec![CellValue::from("2"), CellValue::Empty]);

        let options = TableOptions {
            transpose: true,
            with_header: false,
            ..TableOptions::default()
        };
        let table = import(&options, vec![row(&["1", "2"]), row(&["3"])]);
        let rows: Vec<Vec<String>> = table.into_rows().iter().map(Row::to_strings).collect();
        assert_eq!(rows, vec![vec!["1", "3"], vec!["2", ""]]);
    }

    #[test]
    fn test_export_header_alignment_and_coercion() {
        let written = export(
            &TableOptions::default(),
            vec![
                Row::from_pairs([("x", CellValue::Int(1)), ("y", CellValue::Empty)]),
                Row::from_pairs([
                    ("y", CellValue::Int(4)),
                    ("z", CellValue::Int(9)),
                    ("x", CellValue::Bool(true)),
                ]),
            ],
        );
        assert_eq!(
            written,
            vec![vec!["x", "y"], vec!["1", ""], vec!["", "4"]]
        );
    }

    #[test]
    fn test_export_positional_rows_have_no_header() {
        let written = export(
            &TableOptions::default(),
            vec![row(&["a", "b"]), row(&["c", "d"])],
        );
        assert_eq!(written, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_export_styles() {
        let options = TableOptions::default();
        let bold = Style::new().bold();
        let italic = Style::new().italic();
        let mut recorder = Recorder::default();
        let mut shaper = ExportShaper::new(&options, Some(&bold), Some(&italic), None);
        shaper
            .push(Row::from_pairs([("k", CellValue::Int(1))]), &mut recorder)
            .unwrap();
        assert_eq!(shaper.finish(&mut recorder).unwrap(), 1);
        assert_eq!(recorder.rows[0].1, Some(bold));
        assert_eq!(recorder.rows[1].1, Some(italic));
    }

    #[test]
    fn test_transposed_export() {
        let options = TableOptions {
            transpose: true,
            ..TableOptions::default()
        };
        let written = export(
            &options,
            vec![
                Row::from_pairs([("x", 1i64), ("y", 2)]),
                Row::from_pairs([("x", 3i64), ("y", 4)]),
            ],
        );
        assert_eq!(
            written,
            vec![vec!["0", "1"], vec!["1", "3"], vec!["2", "4"]]
        );

        let written = export(
            &options,
            vec![row(&["a", "b", "c"]), row(&["d"])],
        );
        assert_eq!(
            written,
            vec![vec!["0", "1"], vec!["a", "d"], vec!["b", ""], vec!["c", ""]]
        );
    }

    #[test]
    fn test_transposed_export_callback_sees_pivoted_rows() {
        let options = TableOptions {
            transpose: true,
            ..TableOptions::default()
        };
        let mut seen = Vec::new();
        let mut callback = |r: Row| {
            seen.push(r.entries().into_iter().map(|(k, _)| k).collect::<Vec<_>>());
            let first = r.get_by_name("0")?.as_i64()?;
            (first != 2).then_some(r)
        };
        let mut recorder = Recorder::default();
        let mut shaper = ExportShaper::new(&options, None, None, Some(&mut callback));
        shaper
            .push(Row::from_pairs([("x", 1i64), ("y", 2)]), &mut recorder)
            .unwrap();
        shaper
            .push(Row::from_pairs([("x", 3i64), ("y", 4)]), &mut recorder)
            .unwrap();
        assert!(recorder.rows.is_empty());
        assert_eq!(shaper.finish(&mut recorder).unwrap(), 1);
        assert_eq!(seen, vec![vec!["0", "1"], vec!["0", "1"]]);
        assert_eq!(
            recorder.rows[1].0,
            vec![CellValue::Int(1), CellValue::Int(3)]
        );
    }

    proptest! {
        #[test]
        fn prop_transpose_is_an_involution(
            table in (1usize..6, 1usize..6).prop_flat_map(|(h, w)| {
                prop::collection::vec(prop::collection::vec(any::<i64>(), w), h)
            })
        ) {
            let cells: Vec<Vec<CellValue>> = table
                .iter()
                .map(|r| r.iter().map(|v| CellValue::Int(*v)).collect())
                .collect();
            prop_assert_eq!(transpose(&transpose(&cells)), cells);
        }
    }
}
