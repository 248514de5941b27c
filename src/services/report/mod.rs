// Report Assembler
// Serializes a Report to the two-sheet spreadsheet and the dashboard JSON

pub mod xlsx;

use crate::models::{BinaryLabels, CategoryLabel, LabelScoreMap, Report};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use xlsx::{Cell, Sheet};

pub const TOXICITY_SHEET: &str = "Toxicity";
pub const MISINFORMATION_SHEET: &str = "Misinformation";
pub const COMBINED_SHEET: &str = "Analysis";
pub const COMBINED_STEM: &str = "analysis_results";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to encode report: {0}")]
    Encode(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ReportError> for crate::services::analysis::AnalysisError {
    fn from(e: ReportError) -> Self {
        Self::SerializationFailure(e.to_string())
    }
}

/// Result of rendering or exporting a report. `NoData` means the report had
/// no records and nothing was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Export<T> {
    Ready(T),
    NoData,
}

impl<T> Export<T> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

/// One element of the dashboard JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub sentence: String,
    pub index: usize,
    pub toxicity_level: String,
    pub predictions: LabelScoreMap,
    pub labels: BinaryLabels,
    pub predicted_label: String,
    /// Category key -> score, e.g. `xenophobic`, `misinformation`, `neutral`.
    pub misinformation: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFiles {
    pub xlsx: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub records: usize,
}

pub fn json_records(report: &Report) -> Export<Vec<JsonRecord>> {
    if report.is_empty() {
        return Export::NoData;
    }

    let records = report
        .records()
        .iter()
        .map(|r| JsonRecord {
            sentence: r.unit.text.clone(),
            index: r.unit.index,
            toxicity_level: r.toxicity_level().to_string(),
            predictions: r.toxicity.predictions.clone(),
            labels: r.toxicity.labels.clone(),
            predicted_label: r.predicted_label().to_string(),
            misinformation: report
                .categories
                .iter()
                .map(|c| (c.key.clone(), r.category_score(&c.label)))
                .collect(),
            error: r.toxicity_error.clone().or_else(|| r.category_error.clone()),
        })
        .collect();

    Export::Ready(records)
}

pub fn to_json(report: &Report) -> Result<Export<String>, ReportError> {
    match json_records(report) {
        Export::NoData => Ok(Export::NoData),
        Export::Ready(records) => serde_json::to_string_pretty(&records)
            .map(Export::Ready)
            .map_err(|e| ReportError::Encode(e.to_string())),
    }
}

/// Both sheet projections of the report.
pub fn sheets(report: &Report) -> Result<Export<[Sheet; 2]>, ReportError> {
    if report.is_empty() {
        return Ok(Export::NoData);
    }

    let mut toxicity = Sheet::new(
        TOXICITY_SHEET,
        ["sentence", "toxicity_level", "toxicity_scores", "binary_labels"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    let mut categories = Sheet::new(MISINFORMATION_SHEET, category_header(&report.categories));

    for r in report.records() {
        let scores = serde_json::to_string(&r.toxicity.predictions)
            .map_err(|e| ReportError::Encode(e.to_string()))?;
        let labels = serde_json::to_string(&r.toxicity.labels)
            .map_err(|e| ReportError::Encode(e.to_string()))?;
        toxicity.rows.push(vec![
            Cell::from(r.unit.text.as_str()),
            Cell::from(r.toxicity_level()),
            Cell::from(scores),
            Cell::from(labels),
        ]);

        let mut row = vec![Cell::from(r.unit.text.as_str()), Cell::from(r.predicted_label())];
        row.extend(report.categories.iter().map(|c| Cell::from(r.category_score(&c.label))));
        categories.rows.push(row);
    }

    Ok(Export::Ready([toxicity, categories]))
}

/// One sheet covering several reports, one row per record, tagged with the
/// transcript it came from. Reports without records contribute nothing.
pub fn combined_sheet(reports: &[Report]) -> Result<Export<Sheet>, ReportError> {
    let Some(first) = reports.iter().find(|r| !r.is_empty()) else {
        return Ok(Export::NoData);
    };

    let mut header = vec!["transcript_file".to_string()];
    header.extend(category_header(&first.categories));
    header.insert(3, "toxicity_level".to_string());
    header.extend(["toxicity_scores".to_string(), "binary_labels".to_string()]);
    let mut sheet = Sheet::new(COMBINED_SHEET, header);

    for report in reports {
        for r in report.records() {
            let scores = serde_json::to_string(&r.toxicity.predictions)
                .map_err(|e| ReportError::Encode(e.to_string()))?;
            let labels = serde_json::to_string(&r.toxicity.labels)
                .map_err(|e| ReportError::Encode(e.to_string()))?;

            let mut row = vec![
                Cell::from(report.source.as_str()),
                Cell::from(r.unit.text.as_str()),
                Cell::from(r.predicted_label()),
                Cell::from(r.toxicity_level()),
            ];
            row.extend(first.categories.iter().map(|c| Cell::from(r.category_score(&c.label))));
            row.extend([Cell::from(scores), Cell::from(labels)]);
            sheet.rows.push(row);
        }
    }

    Ok(Export::Ready(sheet))
}

/// Write `analysis_results.xlsx` into `dir` for a batch run.
pub fn write_combined(reports: &[Report], dir: &Path) -> Result<Export<PathBuf>, ReportError> {
    let sheet = match combined_sheet(reports)? {
        Export::NoData => return Ok(Export::NoData),
        Export::Ready(sheet) => sheet,
    };
    let rows = sheet.rows.len();
    let path = dir.join(format!("{}.xlsx", COMBINED_STEM));
    let staged = stage(&path, |file| {
        xlsx::write_workbook(BufWriter::new(file), std::slice::from_ref(&sheet))
            .and_then(|mut w| w.flush().map_err(Into::into))
            .map_err(std::io::Error::other)
    })?;
    let path = staged.commit()?;
    info!(path = %path.display(), reports = reports.len(), rows, "report.combined_written");
    Ok(Export::Ready(path))
}

fn category_header(categories: &[CategoryLabel]) -> Vec<String> {
    let mut header = vec!["sentence".to_string(), "predicted_label".to_string()];
    header.extend(categories.iter().map(|c| format!("{}_score", c.key)));
    header
}

pub fn xlsx_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}_classification.xlsx", stem))
}

pub fn json_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}_classification.json", stem))
}

fn stage_xlsx(report: &Report, path: &Path) -> Result<Export<StagedFile>, ReportError> {
    let sheets = match sheets(report)? {
        Export::NoData => return Ok(Export::NoData),
        Export::Ready(sheets) => sheets,
    };
    let staged = stage(path, |file| {
        xlsx::write_workbook(BufWriter::new(file), &sheets)
            .and_then(|mut w| w.flush().map_err(Into::into))
            .map_err(std::io::Error::other)
    })?;
    Ok(Export::Ready(staged))
}

fn stage_json(report: &Report, path: &Path) -> Result<Export<StagedFile>, ReportError> {
    let json = match to_json(report)? {
        Export::NoData => return Ok(Export::NoData),
        Export::Ready(json) => json,
    };
    Ok(Export::Ready(stage(path, |file| file.write_all(json.as_bytes()))?))
}

/// Write `<stem>_classification.xlsx` into `dir`.
pub fn write_xlsx(report: &Report, dir: &Path, stem: &str) -> Result<Export<PathBuf>, ReportError> {
    match stage_xlsx(report, &xlsx_path(dir, stem))? {
        Export::NoData => Ok(Export::NoData),
        Export::Ready(staged) => {
            let path = staged.commit()?;
            info!(path = %path.display(), records = report.len(), "report.xlsx_written");
            Ok(Export::Ready(path))
        }
    }
}

/// Write `<stem>_classification.json` into `dir`.
pub fn write_json(report: &Report, dir: &Path, stem: &str) -> Result<Export<PathBuf>, ReportError> {
    match stage_json(report, &json_path(dir, stem))? {
        Export::NoData => Ok(Export::NoData),
        Export::Ready(staged) => {
            let path = staged.commit()?;
            info!(path = %path.display(), records = report.len(), "report.json_written");
            Ok(Export::Ready(path))
        }
    }
}

/// Write the requested artifacts as a set. An empty report writes nothing.
///
/// Every artifact is fully encoded to a temp file before any is moved into
/// place; if a later rename fails, artifacts already moved are removed again.
pub fn export(
    report: &Report,
    dir: &Path,
    stem: &str,
    xlsx: bool,
    json: bool,
) -> Result<Export<ExportedFiles>, ReportError> {
    if report.is_empty() {
        info!(source = %report.source, "report.no_data");
        return Ok(Export::NoData);
    }

    let staged_xlsx = if xlsx {
        stage_xlsx(report, &xlsx_path(dir, stem))?
    } else {
        Export::NoData
    };
    let staged_json = if json {
        stage_json(report, &json_path(dir, stem))?
    } else {
        Export::NoData
    };

    let mut committed: Vec<PathBuf> = Vec::new();
    let mut commit = |staged: Export<StagedFile>| -> Result<Option<PathBuf>, ReportError> {
        match staged {
            Export::NoData => Ok(None),
            Export::Ready(file) => match file.commit() {
                Ok(path) => {
                    committed.push(path.clone());
                    Ok(Some(path))
                }
                Err(e) => {
                    for path in &committed {
                        if let Err(err) = fs::remove_file(path) {
                            warn!(path = %path.display(), error = %err, "report.rollback_failed");
                        }
                    }
                    Err(e)
                }
            },
        }
    };

    // staged_json is dropped (temp removed) if the xlsx commit fails
    let xlsx = commit(staged_xlsx)?;
    let json = commit(staged_json)?;

    info!(
        source = %report.source,
        records = report.len(),
        xlsx = xlsx.is_some(),
        json = json.is_some(),
        "report.exported"
    );
    Ok(Export::Ready(ExportedFiles {
        xlsx,
        json,
        records: report.len(),
    }))
}

/// A fully written temp file waiting to be renamed onto `path`. Dropping it
/// uncommitted removes the temp file.
struct StagedFile {
    tmp: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    fn commit(mut self) -> Result<PathBuf, ReportError> {
        fs::rename(&self.tmp, &self.path).map_err(|source| ReportError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.committed = true;
        Ok(self.path.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed && self.tmp.exists() {
            if let Err(e) = fs::remove_file(&self.tmp) {
                warn!(path = %self.tmp.display(), error = %e, "report.tmp_cleanup_failed");
            }
        }
    }
}

/// Write `path`'s content to a temp file in the same directory.
/// On failure the temp file is removed and `path` is left untouched.
fn stage<F>(path: &Path, write: F) -> Result<StagedFile, ReportError>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    let staged = StagedFile {
        tmp: dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4())),
        path: path.to_path_buf(),
        committed: false,
    };

    File::create(&staged.tmp)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
        })
        .map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(staged)
}
