// Workbook reading (xlsx, xlsm, xls, xlsb, ods, csv) and whole-file rendering
// for write-back (xlsx and csv only).
//
// Cells are carried as cached values. Formulas and styling do not survive a
// correction; the rewritten file holds values only.

use std::io::Read;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use wasteaudit_recon::model::FieldValue;
use wasteaudit_recon::parse::parse_date;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Spreadsheet read through calamine.
    Excel,
    /// One CSV file, one sheet.
    Csv,
    /// A directory of CSV files, one sheet per file.
    CsvDir,
}

/// One worksheet as a dense grid of cached values.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Absolute (row, col) of `rows[0][0]`.
    pub origin: (u32, u32),
    pub rows: Vec<Vec<Option<FieldValue>>>,
    /// Backing file for CSV sheets.
    pub file: Option<PathBuf>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), origin: (0, 0), rows: Vec::new(), file: None }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&FieldValue> {
        self.rows.get(row)?.get(col)?.as_ref()
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<FieldValue>) {
        if self.rows.len() <= row {
            self.rows.resize(row + 1, Vec::new());
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, None);
        }
        cells[col] = value;
    }

    /// Index of the first non-empty row.
    pub fn header_row(&self) -> Option<usize> {
        self.rows.iter().position(|r| r.iter().any(Option::is_some))
    }

    pub fn headers(&self) -> Vec<String> {
        let Some(h) = self.header_row() else {
            return Vec::new();
        };
        self.rows[h]
            .iter()
            .map(|c| c.as_ref().map(|v| v.to_string().trim().to_string()).unwrap_or_default())
            .collect()
    }

    /// Non-empty rows below the header, as (grid index, cells).
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[Option<FieldValue>])> {
        let start = self.header_row().map_or(self.rows.len(), |h| h + 1);
        self.rows
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(_, r)| r.iter().any(Option::is_some))
            .map(|(i, r)| (i, r.as_slice()))
    }

    /// 1-based row number as shown in a spreadsheet app.
    pub fn display_row(&self, grid_row: usize) -> usize {
        self.origin.0 as usize + grid_row + 1
    }
}

#[derive(Debug, Clone)]
pub struct SourceWorkbook {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub sheets: Vec<Sheet>,
}

impl SourceWorkbook {
    /// Open a workbook, a CSV file, or a directory of CSV files.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let unavailable = |reason: String| StoreError::SourceUnavailable { path: path.to_path_buf(), reason };

        if path.is_dir() {
            return open_csv_dir(path).map_err(|e| unavailable(e.to_string()));
        }

        let ext = extension(path);
        let workbook = if ext == "csv" {
            let sheet = read_csv_sheet(path).map_err(|e| unavailable(e.to_string()))?;
            Self { path: path.to_path_buf(), format: SourceFormat::Csv, sheets: vec![sheet] }
        } else {
            open_excel(path).map_err(unavailable)?
        };
        log::info!("opened {} ({} sheet(s))", path.display(), workbook.sheets.len());
        Ok(workbook)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    fn sheet_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.sheets
            .iter()
            .position(|s| s.name == wanted)
            .or_else(|| self.sheets.iter().position(|s| s.name.trim().eq_ignore_ascii_case(wanted)))
    }

    /// Sheet by name: exact match first, then trimmed case-insensitive.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheet_index(name).map(|i| &self.sheets[i])
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheet_index(name).map(move |i| &mut self.sheets[i])
    }

    /// File that a change to `sheet` is persisted to.
    pub fn target_file(&self, sheet: &str) -> Result<PathBuf, StoreError> {
        match self.format {
            SourceFormat::Excel => match extension(&self.path).as_str() {
                "xlsx" => Ok(self.path.clone()),
                other => Err(StoreError::UnsupportedFormat(format!(".{other}"))),
            },
            SourceFormat::Csv => Ok(self.path.clone()),
            SourceFormat::CsvDir => self
                .sheet(sheet)
                .and_then(|s| s.file.clone())
                .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string())),
        }
    }

    /// Bytes of the file that holds `sheet`, with current values.
    pub fn render(&self, sheet: &str) -> Result<Vec<u8>, StoreError> {
        match self.format {
            SourceFormat::Excel => render_xlsx(&self.sheets),
            SourceFormat::Csv | SourceFormat::CsvDir => {
                let sheet = self.sheet(sheet).ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))?;
                render_csv(sheet)
            }
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Excel
// ---------------------------------------------------------------------------

fn open_excel(path: &Path) -> Result<SourceWorkbook, String> {
    let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file: {e}"))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err("Excel file contains no sheets".to_string());
    }

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| format!("Failed to read sheet '{sheet_name}': {e}"))?;

        let mut sheet = Sheet::new(sheet_name.clone());
        sheet.origin = range.start().unwrap_or((0, 0));
        sheet.rows = range.rows().map(|r| r.iter().map(cell_value).collect()).collect();
        sheets.push(sheet);
    }

    Ok(SourceWorkbook { path: path.to_path_buf(), format: SourceFormat::Excel, sheets })
}

fn cell_value(data: &Data) -> Option<FieldValue> {
    match data {
        Data::Empty => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(FieldValue::Text(s.clone())),
        Data::Float(n) => Some(FieldValue::Number(*n)),
        Data::Int(n) => Some(FieldValue::Number(*n as f64)),
        Data::Bool(b) => Some(FieldValue::Bool(*b)),
        // Store error as text representation
        Data::Error(e) => Some(FieldValue::Text(format!("#{e:?}"))),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            Some(serial_to_date(serial).map_or(FieldValue::Number(serial), FieldValue::Date))
        }
        Data::DateTimeIso(s) => Some(parse_date(s).map_or_else(|| FieldValue::Text(s.clone()), FieldValue::Date)),
        Data::DurationIso(s) => Some(FieldValue::Text(s.clone())),
    }
}

fn excel_epoch() -> NaiveDate {
    // 1899-12-30 absorbs the 1900 leap-year bug for serials after Feb 1900.
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Excel serial (1900 system) to a calendar date; the time part is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    excel_epoch().checked_add_days(chrono::Days::new(serial.floor() as u64))
}

pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - excel_epoch()).num_days() as f64
}

fn render_xlsx(sheets: &[Sheet]) -> Result<Vec<u8>, StoreError> {
    let render_err = |e: rust_xlsxwriter::XlsxError| StoreError::Render(e.to_string());
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let mut xlsx_workbook = XlsxWorkbook::new();

    for sheet in sheets {
        let worksheet = xlsx_workbook.add_worksheet().set_name(&sheet.name).map_err(render_err)?;

        for (r, cells) in sheet.rows.iter().enumerate() {
            let row32 = sheet.origin.0 + r as u32;
            for (c, cell) in cells.iter().enumerate() {
                let Some(value) = cell else { continue };
                let col16 = u16::try_from(sheet.origin.1 as usize + c)
                    .map_err(|_| StoreError::Render(format!("sheet '{}': too many columns", sheet.name)))?;
                match value {
                    FieldValue::Number(n) => worksheet.write_number(row32, col16, *n).map(|_| ()),
                    FieldValue::Text(s) => worksheet.write_string(row32, col16, s).map(|_| ()),
                    FieldValue::Bool(b) => worksheet.write_boolean(row32, col16, *b).map(|_| ()),
                    FieldValue::Date(d) => worksheet
                        .write_number_with_format(row32, col16, date_to_serial(*d), &date_format)
                        .map(|_| ()),
                }
                .map_err(render_err)?;
            }
        }
    }

    xlsx_workbook.save_to_buffer().map_err(render_err)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn read_csv_sheet(path: &Path) -> Result<Sheet, Box<dyn std::error::Error>> {
    let content = read_file_as_utf8(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Sheet1".to_string());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut sheet = Sheet::new(name);
    sheet.file = Some(path.to_path_buf());
    for result in reader.records() {
        let record = result?;
        sheet.rows.push(
            record
                .iter()
                .map(|field| (!field.trim().is_empty()).then(|| FieldValue::Text(field.to_string())))
                .collect(),
        );
    }
    Ok(sheet)
}

fn open_csv_dir(dir: &Path) -> Result<SourceWorkbook, Box<dyn std::error::Error>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && extension(p) == "csv")
        .collect();
    files.sort();
    if files.is_empty() {
        return Err("directory contains no .csv files".into());
    }

    let sheets = files.iter().map(|f| read_csv_sheet(f)).collect::<Result<Vec<_>, _>>()?;
    log::info!("opened {} ({} csv sheet(s))", dir.display(), sheets.len());
    Ok(SourceWorkbook { path: dir.to_path_buf(), format: SourceFormat::CsvDir, sheets })
}

fn render_csv(sheet: &Sheet) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for cells in &sheet.rows {
        let record: Vec<String> = cells
            .iter()
            .map(|c| c.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect();
        writer.write_record(&record).map_err(|e| StoreError::Render(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| StoreError::Render(e.to_string()))
}
