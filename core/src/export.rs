//! Writing the visible view of a dataset to XLSX, CSV, TSV or JSON

use crate::config::ExportConfig;
use crate::data::{Cell, Dataset};
use crate::error::{Result, SmartFilterError};
use log::info;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Worksheet holding an XLSX export
pub const XLSX_SHEET_NAME: &str = "FilteredData";

const XLSX_MAX_COLUMNS: usize = 16_384;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Excel workbook with a single worksheet
    #[default]
    Xlsx,
    /// Comma-separated values (or a custom delimiter)
    Csv,
    /// Tab-separated values
    Tsv,
    /// Array of objects
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }

    /// Determine format from file extension
    pub fn from_extension(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") => Ok(ExportFormat::Xlsx),
            Some("csv") => Ok(ExportFormat::Csv),
            Some("tsv") => Ok(ExportFormat::Tsv),
            Some("json") => Ok(ExportFormat::Json),
            Some(ext) => Err(SmartFilterError::export(format!(
                "Unsupported export extension '.{ext}' (use .xlsx, .csv, .tsv or .json)"
            ))),
            None => Err(SmartFilterError::export("No file extension provided")),
        }
    }
}

/// Export options for customizing output
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Whether to include a header record (not used for JSON)
    pub include_header: bool,
    /// Delimiter for CSV output; TSV always uses a tab
    pub delimiter: char,
    /// Whether to overwrite an existing file
    pub force: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_header: true,
            delimiter: ',',
            force: false,
        }
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            include_header: config.include_header,
            delimiter: config.delimiter,
            force: false,
        }
    }
}

/// Write the rows of `dataset` projected onto its visible headers.
///
/// Returns the number of rows written.
pub fn export_view(dataset: &Dataset, path: &Path, options: &ExportOptions) -> Result<usize> {
    let format = ExportFormat::from_extension(path)?;
    if path.exists() && !options.force {
        return Err(SmartFilterError::export(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match format {
        ExportFormat::Xlsx => write_xlsx(dataset, path, options.include_header)?,
        ExportFormat::Csv => write_delimited(dataset, path, delimiter_byte(options.delimiter)?, options.include_header)?,
        ExportFormat::Tsv => write_delimited(dataset, path, b'\t', options.include_header)?,
        ExportFormat::Json => write_json(dataset, path)?,
    }

    info!(
        "Exported {} rows x {} columns to {}",
        dataset.row_count(),
        dataset.column_count(),
        path.display()
    );
    Ok(dataset.row_count())
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() && delimiter != '"' && delimiter != '\n' {
        Ok(delimiter as u8)
    } else {
        Err(SmartFilterError::export(format!(
            "Delimiter must be a single ASCII character, got {delimiter:?}"
        )))
    }
}

fn write_delimited(dataset: &Dataset, path: &Path, delimiter: u8, include_header: bool) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;

    if include_header {
        writer.write_record(&dataset.headers)?;
    }
    for row in &dataset.rows {
        writer.write_record(
            dataset
                .headers
                .iter()
                .map(|h| row.get(h).map(Cell::to_string).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(dataset: &Dataset, path: &Path, include_header: bool) -> Result<()> {
    if dataset.headers.len() > XLSX_MAX_COLUMNS {
        return Err(SmartFilterError::export(format!(
            "An XLSX sheet holds at most {XLSX_MAX_COLUMNS} columns, the view has {}",
            dataset.headers.len()
        )));
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(XLSX_SHEET_NAME).map_err(xlsx_error)?;

    let mut first_row = 0;
    if include_header {
        for (col, header) in (0u16..).zip(&dataset.headers) {
            worksheet.write_string(0, col, header.as_str()).map_err(xlsx_error)?;
        }
        first_row = 1;
    }
    for (offset, row) in dataset.rows.iter().enumerate() {
        let index = u32::try_from(offset)
            .ok()
            .and_then(|offset| offset.checked_add(first_row))
            .ok_or_else(|| SmartFilterError::export("Too many rows for an XLSX sheet"))?;
        for (col, header) in (0u16..).zip(&dataset.headers) {
            let written = match row.get(header) {
                Some(Cell::Number(n)) => worksheet.write_number(index, col, *n),
                Some(Cell::Bool(b)) => worksheet.write_boolean(index, col, *b),
                Some(Cell::Text(s)) => worksheet.write_string(index, col, s.as_str()),
                Some(Cell::Empty) | None => continue,
            };
            written.map_err(xlsx_error)?;
        }
    }

    workbook.save(path).map_err(xlsx_error)?;
    Ok(())
}

fn xlsx_error(e: XlsxError) -> SmartFilterError {
    SmartFilterError::export(e.to_string())
}

fn write_json(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &dataset.visible_rows())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// `<stem>_filtered.<ext>`, where the stem is the source name up to its first dot
pub fn suggested_export_name(source_name: &str, format: ExportFormat) -> String {
    let file_name = Path::new(source_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source_name);
    let stem = file_name.split('.').next().filter(|s| !s.is_empty()).unwrap_or("export");
    format!("{stem}_filtered.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::products_dataset;
    use calamine::{open_workbook_auto, Data, Reader};
    use tempfile::TempDir;

    #[test]
    fn test_export_format_from_extension() {
        assert_eq!(ExportFormat::from_extension(Path::new("out.CSV")).unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_extension(Path::new("out.tsv")).unwrap(), ExportFormat::Tsv);
        assert_eq!(ExportFormat::from_extension(Path::new("out.json")).unwrap(), ExportFormat::Json);
        assert_eq!(ExportFormat::from_extension(Path::new("out.XLSX")).unwrap(), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::default(), ExportFormat::Xlsx);
        assert!(ExportFormat::from_extension(Path::new("out.parquet")).is_err());
        assert!(ExportFormat::from_extension(Path::new("out")).is_err());
    }

    #[test]
    fn test_csv_export_projects_visible_columns() {
        let dir = TempDir::new().unwrap();
        let base = products_dataset();
        let view = base.derive_view(
            vec!["Price".to_string(), "Name".to_string()],
            base.original_rows[1..3].to_vec(),
            Some("two".to_string()),
        );

        let path = dir.path().join("out.csv");
        let written = export_view(&view, &path, &ExportOptions::default()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Price,Name\n150,B\n200,C\n");
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.tsv");
        fs::write(&path, "keep me").unwrap();
        let dataset = products_dataset();

        let err = export_view(&dataset, &path, &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, SmartFilterError::Export(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");

        let options = ExportOptions {
            force: true,
            include_header: false,
            ..Default::default()
        };
        export_view(&dataset, &path, &options).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("A\t50\tTools\n"));
    }

    #[test]
    fn test_json_export() {
        let dir = TempDir::new().unwrap();
        let base = products_dataset();
        let view = base.derive_view(vec!["Name".to_string()], base.original_rows[..1].to_vec(), None);
        let path = dir.path().join("nested/out.json");

        export_view(&view, &path, &ExportOptions::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, serde_json::json!([{ "Name": "A" }]));
    }

    #[test]
    fn test_custom_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let options = ExportOptions {
            delimiter: ';',
            ..Default::default()
        };
        export_view(&products_dataset(), &path, &options).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("Name;Price;Category\n"));

        let bad = ExportOptions {
            delimiter: 'é',
            force: true,
            ..Default::default()
        };
        assert!(export_view(&products_dataset(), &path, &bad).is_err());
    }

    #[test]
    fn test_xlsx_export_keeps_cell_types() {
        let dir = TempDir::new().unwrap();
        let base = products_dataset();
        let view = base.derive_view(
            vec!["Name".to_string(), "Price".to_string()],
            base.original_rows[..3].to_vec(),
            Some("first three".to_string()),
        );
        let path = dir.path().join("out.xlsx");

        assert_eq!(export_view(&view, &path, &ExportOptions::default()).unwrap(), 3);

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec![XLSX_SHEET_NAME.to_string()]);
        let range = workbook.worksheet_range(XLSX_SHEET_NAME).unwrap();
        assert_eq!(range.get_size(), (4, 2));
        assert_eq!(range.get((0, 0)), Some(&Data::String("Name".to_string())));
        assert_eq!(range.get((1, 0)), Some(&Data::String("A".to_string())));
        assert_eq!(range.get((2, 1)), Some(&Data::Float(150.0)));
        // Numeric text stays text
        assert_eq!(range.get((3, 1)), Some(&Data::String("200".to_string())));
    }

    #[test]
    fn test_suggested_export_name() {
        assert_eq!(suggested_export_name("sales.2024.xlsx", ExportFormat::Csv), "sales_filtered.csv");
        assert_eq!(suggested_export_name("/tmp/report.csv", ExportFormat::Json), "report_filtered.json");
        assert_eq!(suggested_export_name(".hidden", ExportFormat::Tsv), "export_filtered.tsv");
        assert_eq!(
            suggested_export_name("inventory.xls", ExportFormat::default()),
            "inventory_filtered.xlsx"
        );
    }
}
