//! The [`Excel`] façade: import and export of whole tables
//!
//! A session picks the format from the file name, opens a reader or writer
//! through its [`CodecFactory`], and runs every sheet through the table
//! shaping of [`crate::transform`]. Readers are released on every exit path;
//! writers only produce a valid file when the whole export succeeds.

use crate::config::{CsvOptions, TableOptions};
use crate::download::DownloadSink;
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::reader::{open_reader, SheetReader};
use crate::transform::{ExportShaper, ImportShaper, RowCallback, Table};
use crate::types::{IntoRow, Row, SheetHandle, Style};
use crate::writer::{create_writer, SheetWriter};
use indexmap::IndexMap;
use log::debug;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Opens readers and writers for a session
///
/// The default factory dispatches on [`Format`]; supply your own to wrap or
/// replace the codecs (for instance in tests).
pub trait CodecFactory {
    fn reader(&self, path: &Path, csv: &CsvOptions) -> Result<Box<dyn SheetReader>>;

    fn writer<'w>(
        &self,
        format: Format,
        output: Box<dyn Write + 'w>,
        csv: &CsvOptions,
    ) -> Result<Box<dyn SheetWriter + 'w>>;
}

/// The built-in CSV, XLSX and ODS codecs
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodecFactory;

impl CodecFactory for DefaultCodecFactory {
    fn reader(&self, path: &Path, csv: &CsvOptions) -> Result<Box<dyn SheetReader>> {
        open_reader(path, csv)
    }

    fn writer<'w>(
        &self,
        format: Format,
        output: Box<dyn Write + 'w>,
        csv: &CsvOptions,
    ) -> Result<Box<dyn SheetWriter + 'w>> {
        create_writer(format, output, csv)
    }
}

/// Key of a sheet in a multi-sheet import
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SheetKey {
    /// Zero-based position in the workbook
    Index(usize),
    Name(String),
}

impl fmt::Display for SheetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetKey::Index(i) => write!(f, "{}", i),
            SheetKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for SheetKey {
    fn from(index: usize) -> Self {
        SheetKey::Index(index)
    }
}

impl From<&str> for SheetKey {
    fn from(name: &str) -> Self {
        SheetKey::Name(name.to_string())
    }
}

/// Tables to export as separate sheets, in order
#[derive(Debug, Clone, Default)]
pub struct SheetCollection {
    sheets: Vec<(Option<String>, Vec<Row>)>,
}

impl SheetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet with a generated name
    pub fn push<I, R>(&mut self, rows: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: IntoRow,
    {
        self.sheets
            .push((None, rows.into_iter().map(IntoRow::into_row).collect()));
        self
    }

    pub fn push_named<I, R>(&mut self, name: impl Into<String>, rows: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: IntoRow,
    {
        self.sheets.push((
            Some(name.into()),
            rows.into_iter().map(IntoRow::into_row).collect(),
        ));
        self
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

impl<K, I, R> FromIterator<(K, I)> for SheetCollection
where
    K: Into<String>,
    I: IntoIterator<Item = R>,
    R: IntoRow,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut sheets = SheetCollection::new();
        for (name, rows) in iter {
            sheets.push_named(name, rows);
        }
        sheets
    }
}

/// Hook that adjusts CSV options right before a reader or writer opens
pub type OptionsConfigurator = Box<dyn Fn(&mut CsvOptions, Format)>;

/// Closes the reader however the import ends
struct ReaderGuard(Box<dyn SheetReader>);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Import/export session
///
/// # Examples
///
/// ```no_run
/// use miniexcel::{CellValue, Excel, Row};
///
/// # fn main() -> miniexcel::Result<()> {
/// let users = vec![
///     Row::from_pairs([("name", CellValue::from("ada")), ("age", CellValue::Int(36))]),
///     Row::from_pairs([("name", CellValue::from("alan")), ("age", CellValue::Int(41))]),
/// ];
/// Excel::new().export("users.xlsx", users)?;
///
/// let table = Excel::new().import("users.xlsx")?;
/// for user in table.rows().unwrap_or_default() {
///     println!("{:?}", user.get_by_name("name"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Excel<F: CodecFactory = DefaultCodecFactory> {
    factory: F,
    table: TableOptions,
    csv: CsvOptions,
    header_style: Option<Style>,
    rows_style: Option<Style>,
    configure: Option<OptionsConfigurator>,
}

impl Default for Excel {
    fn default() -> Self {
        Excel::new()
    }
}

impl Excel {
    pub fn new() -> Self {
        Excel::with_factory(DefaultCodecFactory)
    }
}

impl<F: CodecFactory> Excel<F> {
    /// Session whose readers and writers come from `factory`
    pub fn with_factory(factory: F) -> Self {
        Excel {
            factory,
            table: TableOptions::default(),
            csv: CsvOptions::default(),
            header_style: None,
            rows_style: None,
            configure: None,
        }
    }

    /// One-based sheet read by [`import`](Self::import)
    pub fn sheet(mut self, number: usize) -> Self {
        self.table.sheet_index = number;
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.table.with_header = false;
        self
    }

    /// Key [`import_sheets`](Self::import_sheets) results by sheet name
    pub fn with_sheets_names(mut self) -> Self {
        self.table.use_sheet_names_as_keys = true;
        self
    }

    /// Zero-based physical row where the header (or the data) begins
    pub fn start_row(mut self, row: usize) -> Self {
        self.table.start_row = row;
        self
    }

    pub fn transpose(mut self) -> Self {
        self.table.transpose = true;
        self
    }

    pub fn table_options(mut self, options: TableOptions) -> Self {
        self.table = options;
        self
    }

    /// CSV dialect; `bom` only affects writing
    pub fn configure_csv(mut self, delimiter: u8, enclosure: u8, encoding: &str, bom: bool) -> Self {
        self.csv = CsvOptions {
            delimiter,
            enclosure,
            encoding: encoding.to_string(),
            byte_order_mark: bom,
        };
        self
    }

    pub fn header_style(mut self, style: Style) -> Self {
        self.header_style = Some(style);
        self
    }

    pub fn rows_style(mut self, style: Style) -> Self {
        self.rows_style = Some(style);
        self
    }

    /// Adjust the CSV options of every reader and writer this session opens
    pub fn configure_options_using<C>(mut self, configure: C) -> Self
    where
        C: Fn(&mut CsvOptions, Format) + 'static,
    {
        self.configure = Some(Box::new(configure));
        self
    }

    fn csv_options(&self, format: Format) -> CsvOptions {
        let mut csv = self.csv.clone();
        if let Some(configure) = &self.configure {
            configure(&mut csv, format);
        }
        csv
    }

    fn open(&self, path: &Path) -> Result<ReaderGuard> {
        let csv = self.csv_options(Format::from_path(path));
        Ok(ReaderGuard(self.factory.reader(path, &csv)?))
    }

    // ---- import ----

    /// Records of the sheet selected by [`sheet`](Self::sheet).
    ///
    /// A sheet number past the end of the workbook gives an empty table.
    pub fn import<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        self.import_sheet(path.as_ref(), None)
    }

    /// Like [`import`](Self::import), passing every record through
    /// `callback`; records it maps to `None` are left out
    pub fn import_with<P, C>(&self, path: P, mut callback: C) -> Result<Table>
    where
        P: AsRef<Path>,
        C: FnMut(Row) -> Option<Row>,
    {
        self.import_sheet(path.as_ref(), Some(&mut callback))
    }

    /// Every sheet, keyed by position or, with
    /// [`with_sheets_names`](Self::with_sheets_names), by name
    pub fn import_sheets<P: AsRef<Path>>(&self, path: P) -> Result<IndexMap<SheetKey, Table>> {
        self.import_all(path.as_ref(), None)
    }

    pub fn import_sheets_with<P, C>(
        &self,
        path: P,
        mut callback: C,
    ) -> Result<IndexMap<SheetKey, Table>>
    where
        P: AsRef<Path>,
        C: FnMut(Row) -> Option<Row>,
    {
        self.import_all(path.as_ref(), Some(&mut callback))
    }

    fn import_sheet(&self, path: &Path, callback: Option<&mut RowCallback<'_>>) -> Result<Table> {
        let mut reader = self.open(path)?;
        let sheets = reader.0.sheets()?;
        let wanted = self.table.sheet_index.checked_sub(1);
        let Some(sheet) = wanted.and_then(|i| sheets.get(i)) else {
            debug!(
                "{}: no sheet number {}, {} sheet(s) present",
                path.display(),
                self.table.sheet_index,
                sheets.len()
            );
            return Ok(Table::default());
        };
        let table = self.read_sheet(reader.0.as_mut(), sheet, callback)?;
        debug!("{}: imported {} record(s)", path.display(), table.len());
        Ok(table)
    }

    fn import_all(
        &self,
        path: &Path,
        mut callback: Option<&mut RowCallback<'_>>,
    ) -> Result<IndexMap<SheetKey, Table>> {
        let mut reader = self.open(path)?;
        let mut tables = IndexMap::new();
        for sheet in reader.0.sheets()? {
            let table = self.read_sheet(reader.0.as_mut(), &sheet, callback.as_deref_mut())?;
            let key = if self.table.use_sheet_names_as_keys {
                SheetKey::Name(sheet.name)
            } else {
                SheetKey::Index(sheet.index)
            };
            tables.insert(key, table);
        }
        debug!("{}: imported {} sheet(s)", path.display(), tables.len());
        Ok(tables)
    }

    fn read_sheet(
        &self,
        reader: &mut dyn SheetReader,
        sheet: &SheetHandle,
        callback: Option<&mut RowCallback<'_>>,
    ) -> Result<Table> {
        let mut shaper = ImportShaper::new(&self.table, callback);
        for row in reader.rows(sheet)? {
            shaper.push(row?)?;
        }
        Ok(shaper.finish())
    }

    // ---- export ----

    /// Write `rows` to `path` as one sheet; returns the written path
    pub fn export<P, I, R>(&self, path: P, rows: I) -> Result<PathBuf>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = R>,
        R: IntoRow,
    {
        let path = path.as_ref();
        let mut writer = self.create(path)?;
        self.write_rows(writer.as_mut(), rows, None)?;
        writer.close()?;
        Ok(written_path(path))
    }

    /// Like [`export`](Self::export), passing every record through
    /// `callback` before it is coerced and written
    pub fn export_with<P, I, R, C>(&self, path: P, rows: I, mut callback: C) -> Result<PathBuf>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = R>,
        R: IntoRow,
        C: FnMut(Row) -> Option<Row>,
    {
        let path = path.as_ref();
        let mut writer = self.create(path)?;
        self.write_rows(writer.as_mut(), rows, Some(&mut callback))?;
        writer.close()?;
        Ok(written_path(path))
    }

    /// Write each table of `sheets` as its own sheet.
    ///
    /// CSV holds a single sheet, so more than one table is rejected before
    /// the file is created.
    pub fn export_sheets<P: AsRef<Path>>(&self, path: P, sheets: SheetCollection) -> Result<PathBuf> {
        let path = path.as_ref();
        check_sheet_count(Format::from_path(path), &sheets)?;
        let mut writer = self.create(path)?;
        self.write_sheets(writer.as_mut(), sheets)?;
        writer.close()?;
        Ok(written_path(path))
    }

    /// Stream `rows` as a file named `filename` into `sink`; the format
    /// follows the name's extension
    pub fn download<I, R>(&self, filename: &str, rows: I, sink: &mut dyn DownloadSink) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoRow,
    {
        let format = Format::from_path(filename);
        let csv = self.csv_options(format);
        debug!("streaming download '{}' as {:?}", filename, format);
        sink.stream_download(
            filename,
            format.content_type(),
            Box::new(move |out: &mut dyn Write| {
                let mut writer = self.factory.writer(format, Box::new(out), &csv)?;
                self.write_rows(writer.as_mut(), rows, None)?;
                writer.close()
            }),
        )
    }

    pub fn download_sheets(
        &self,
        filename: &str,
        sheets: SheetCollection,
        sink: &mut dyn DownloadSink,
    ) -> Result<()> {
        let format = Format::from_path(filename);
        check_sheet_count(format, &sheets)?;
        let csv = self.csv_options(format);
        sink.stream_download(
            filename,
            format.content_type(),
            Box::new(move |out: &mut dyn Write| {
                let mut writer = self.factory.writer(format, Box::new(out), &csv)?;
                self.write_sheets(writer.as_mut(), sheets)?;
                writer.close()
            }),
        )
    }

    fn create(&self, path: &Path) -> Result<Box<dyn SheetWriter>> {
        let format = Format::from_path(path);
        let csv = self.csv_options(format);
        // resolve the dialect before the file is truncated
        csv.resolve()?;
        let file = File::create(path)?;
        debug!("exporting {:?} to {}", format, path.display());
        self.factory.writer(
            format,
            Box::new(BufWriter::with_capacity(64 * 1024, file)),
            &csv,
        )
    }

    fn write_rows<I, R>(
        &self,
        writer: &mut dyn SheetWriter,
        rows: I,
        callback: Option<&mut RowCallback<'_>>,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = R>,
        R: IntoRow,
    {
        let mut shaper = ExportShaper::new(
            &self.table,
            self.header_style.as_ref(),
            self.rows_style.as_ref(),
            callback,
        );
        for row in rows {
            shaper.push(row.into_row(), writer)?;
        }
        shaper.finish(writer)
    }

    fn write_sheets(&self, writer: &mut dyn SheetWriter, sheets: SheetCollection) -> Result<()> {
        let multi = writer.format().supports_multiple_sheets();
        let taken: Vec<String> = sheets
            .sheets
            .iter()
            .filter_map(|(name, _)| name.as_ref().map(|n| n.to_lowercase()))
            .collect();
        let mut next_default = 1;

        for (name, rows) in sheets.sheets {
            match name {
                Some(name) => writer.add_sheet(&name)?,
                None if multi => {
                    let name = loop {
                        let candidate = format!("Sheet{}", next_default);
                        next_default += 1;
                        if !taken.contains(&candidate.to_lowercase()) {
                            break candidate;
                        }
                    };
                    writer.add_sheet(&name)?;
                }
                None => {}
            }
            let written = self.write_rows(writer, rows, None)?;
            debug!("sheet written with {} row(s)", written);
        }
        Ok(())
    }
}

fn check_sheet_count(format: Format, sheets: &SheetCollection) -> Result<()> {
    if !format.supports_multiple_sheets() && sheets.len() > 1 {
        return Err(ExcelError::Argument(format!(
            "{} sheets given but {} files hold a single sheet",
            sheets.len(),
            format.extension()
        )));
    }
    Ok(())
}

fn written_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::BufferSink;
    use crate::types::CellValue;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn records() -> Vec<Row> {
        vec![
            Row::from_pairs([("x", 1i64), ("y", 2)]),
            Row::from_pairs([("x", 3i64), ("y", 4)]),
        ]
    }

    #[test]
    fn test_sheet_keys() {
        assert_eq!(SheetKey::from(2), SheetKey::Index(2));
        assert_eq!(SheetKey::from("Data").to_string(), "Data");
    }

    #[test]
    fn test_csv_rejects_several_sheets_before_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.csv");
        let mut sheets = SheetCollection::new();
        sheets.push(records()).push(records());
        let err = Excel::new().export_sheets(&path, sheets).unwrap_err();
        assert!(matches!(err, ExcelError::Argument(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_generated_sheet_names_avoid_given_ones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let mut sheets = SheetCollection::new();
        sheets
            .push(records())
            .push_named("sheet1", records())
            .push(records());
        Excel::new().export_sheets(&path, sheets).unwrap();

        let mut reader = open_reader(&path, &CsvOptions::default()).unwrap();
        let names: Vec<String> = reader.sheets().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Sheet2", "sheet1", "Sheet3"]);
    }

    #[test]
    fn test_configurator_sees_format() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let excel = Excel::new().configure_options_using(move |csv, format| {
            log.borrow_mut().push(format);
            csv.delimiter = b';';
        });

        let mut sink = BufferSink::default();
        excel.download("a.csv", records(), &mut sink).unwrap();
        assert_eq!(sink.body, b"x;y\n1;2\n3;4\n");
        assert_eq!(*seen.borrow(), vec![Format::Csv]);
    }

    #[test]
    fn test_out_of_range_sheet_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.ods");
        Excel::new().export(&path, records()).unwrap();
        assert!(Excel::new().sheet(5).import(&path).unwrap().is_empty());
        assert!(Excel::new().sheet(0).import(&path).unwrap().is_empty());
        assert_eq!(Excel::new().sheet(1).import(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_download_sheets() {
        let mut sink = BufferSink::default();
        let sheets: SheetCollection = vec![("A", records()), ("B", Vec::new())]
            .into_iter()
            .collect();
        Excel::new()
            .download_sheets("exports/book.xlsx", sheets, &mut sink)
            .unwrap();
        assert_eq!(sink.filename, "exports/book.xlsx");
        assert!(sink.content_type.contains("spreadsheetml"));
        assert_eq!(&sink.body[..2], b"PK");
    }

    /// Factory that counts the readers it opens
    struct Counting {
        opened: RefCell<usize>,
    }

    impl CodecFactory for Counting {
        fn reader(&self, path: &Path, csv: &CsvOptions) -> Result<Box<dyn SheetReader>> {
            *self.opened.borrow_mut() += 1;
            open_reader(path, csv)
        }

        fn writer<'w>(
            &self,
            format: Format,
            output: Box<dyn Write + 'w>,
            csv: &CsvOptions,
        ) -> Result<Box<dyn SheetWriter + 'w>> {
            create_writer(format, output, csv)
        }
    }

    #[test]
    fn test_custom_factory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a\n1\n").unwrap();
        let excel = Excel::with_factory(Counting {
            opened: RefCell::new(0),
        });
        let table = excel.import(&path).unwrap();
        assert_eq!(
            table.rows().unwrap()[0].get_by_name("a"),
            Some(&CellValue::from("1"))
        );
        assert_eq!(*excel.factory.opened.borrow(), 1);
    }
}
