// Command layer
// Wires configuration, service clients and the pipeline together for the CLI.
// Service clients are built once here and handed to the pipeline by Arc.

use crate::models::{ChunkPolicy, DocumentToxicity, Report, ReportSummary, UnitMode};
use crate::services::analysis::{
    score_document, threshold_preset, translate_to_english, AnalysisError, AnalysisPipeline,
    ClassificationAdapter, Sensitivity, Translator,
};
use crate::services::config_store::{AppConfig, ConfigStore, OutputConfig};
use crate::services::providers::ServiceClient;
use crate::services::report::{self, Export, ExportedFiles};
use crate::services::text_processor::normalize_transcript;
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const USAGE: &str = "Usage:
  toxiscan analyze <file.txt> [--out-dir <dir>] [--unit sentence|chunk] [--policy average|any_chunk]
                              [--sensitivity low|medium|high] [--chunk <chars>] [--translate]
                              [--no-categories] [--no-xlsx] [--no-json] [--config <config.json>]
  toxiscan analyze-dir <dir> [--no-combined] [same options as analyze]
  toxiscan score <file.txt> [--policy average|any_chunk] [--sensitivity low|medium|high] [--config <config.json>]
  toxiscan config show [--config <config.json>]
  toxiscan config init [--config <config.json>]

Environment:
  TOXISCAN_TOXICITY_URL / TOXISCAN_ZERO_SHOT_URL / TOXISCAN_TRANSLATION_URL override service URLs.
  TOXISCAN_LOG_DIR, TOXISCAN_DISABLE_FILE_LOG=1 control file logging; RUST_LOG sets the level.";

pub fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

pub fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn config_store(args: &[String]) -> anyhow::Result<ConfigStore> {
    match parse_arg_value(args, "--config") {
        Some(path) => Ok(ConfigStore::at_file(PathBuf::from(path))),
        None => ConfigStore::default_config_dir()
            .map(ConfigStore::new)
            .ok_or_else(|| anyhow!("no config directory available; pass --config")),
    }
}

/// Load config and apply env and command-line overrides.
pub fn load_config(args: &[String]) -> anyhow::Result<AppConfig> {
    let store = config_store(args)?;
    let mut config = store.load().map_err(|e| anyhow!(e))?;
    config.apply_env_overrides();

    if let Some(unit) = parse_arg_value(args, "--unit") {
        config.analysis.unit_mode = UnitMode::parse(&unit)
            .ok_or_else(|| AnalysisError::InvalidConfiguration(format!("unknown unit '{}'", unit)))?;
    }
    if let Some(policy) = parse_arg_value(args, "--policy") {
        config.analysis.chunk_policy = ChunkPolicy::parse(&policy).ok_or_else(|| {
            AnalysisError::InvalidConfiguration(format!("unknown chunk policy '{}'", policy))
        })?;
    }
    if let Some(sensitivity) = parse_arg_value(args, "--sensitivity") {
        config.analysis.sensitivity = Some(sensitivity);
    }
    if let Some(chunk) = parse_arg_value(args, "--chunk") {
        config.analysis.chunk_size_chars = chunk.parse().map_err(|_| {
            AnalysisError::InvalidConfiguration(format!("chunk size '{}' is not an integer", chunk))
        })?;
    }
    if let Some(dir) = parse_arg_value(args, "--out-dir") {
        config.output.dir = Some(PathBuf::from(dir));
    }
    if has_flag(args, "--translate") {
        config.translation.enabled = true;
    }
    if has_flag(args, "--no-categories") {
        config.analysis.score_categories = false;
    }
    if has_flag(args, "--no-xlsx") {
        config.output.write_xlsx = false;
    }
    if has_flag(args, "--no-json") {
        config.output.write_json = false;
    }

    config.validate()?;
    Ok(config)
}

fn build_adapter(config: &AppConfig, client: &Arc<ServiceClient>) -> ClassificationAdapter {
    let labels = config
        .pipeline_settings()
        .map(|s| s.thresholds.labels().map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    let mut adapter = ClassificationAdapter::new(client.clone(), labels)
        .with_timeout(config.services.timeout())
        .with_max_attempts(config.services.max_attempts as usize)
        .with_max_input_chars(config.services.max_input_chars);
    if config.analysis.score_categories {
        adapter = adapter.with_categories(client.clone());
    }
    adapter
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutcome {
    pub source: String,
    pub translated_path: Option<PathBuf>,
    pub summary: Option<ReportSummary>,
    pub xlsx: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// Result of analyzing every transcript in a directory.
#[derive(Debug)]
pub struct BatchOutcome {
    pub files: Vec<AnalyzeOutcome>,
    pub failed: Vec<(PathBuf, String)>,
    pub records: usize,
    pub combined: Option<PathBuf>,
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(normalize_transcript(&raw))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "transcript".to_string())
}

/// `*.txt` files directly inside `dir`, sorted by name.
pub fn transcript_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read dir {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();
    Ok(files)
}

/// Pipeline plus optional translation and output settings; shared across files.
pub struct Analyzer {
    pipeline: AnalysisPipeline,
    translator: Option<Arc<dyn Translator>>,
    translation_chunk_size: usize,
    translation_timeout: Duration,
    output: OutputConfig,
}

impl Analyzer {
    pub fn new(pipeline: AnalysisPipeline, output: OutputConfig) -> Self {
        Self {
            pipeline,
            translator: None,
            translation_chunk_size: 400,
            translation_timeout: Duration::from_secs(30),
            output,
        }
    }

    /// Build the HTTP client once and wire it into every backend.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = Arc::new(ServiceClient::from_config(&config.services)?);
        let pipeline = AnalysisPipeline::new(build_adapter(config, &client), config.pipeline_settings()?)?;
        let mut analyzer = Self::new(pipeline, config.output.clone());
        if config.translation.enabled {
            analyzer = analyzer.with_translator(
                client,
                config.translation_chunk_size()?,
                config.services.timeout(),
            );
        }
        Ok(analyzer)
    }

    pub fn with_translator(
        mut self,
        translator: Arc<dyn Translator>,
        chunk_size: usize,
        timeout: Duration,
    ) -> Self {
        self.translator = Some(translator);
        self.translation_chunk_size = chunk_size;
        self.translation_timeout = timeout;
        self
    }

    fn out_dir(&self, fallback: Option<&Path>) -> anyhow::Result<PathBuf> {
        let dir = self
            .output
            .dir
            .clone()
            .or_else(|| fallback.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(dir)
    }

    /// Analyze one transcript file and write its report artifacts.
    pub async fn analyze_file(&self, path: &Path) -> anyhow::Result<AnalyzeOutcome> {
        Ok(self.analyze_path(path).await?.0)
    }

    async fn analyze_path(&self, path: &Path) -> anyhow::Result<(AnalyzeOutcome, Option<Report>)> {
        let source = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let out_dir = self.out_dir(path.parent())?;

        let mut stem = file_stem(path);
        let mut text = read_input(path)?;
        let mut translated_path = None;

        if let Some(translator) = &self.translator {
            if !text.trim().is_empty() {
                text = translate_to_english(
                    translator.as_ref(),
                    &text,
                    self.translation_chunk_size,
                    self.translation_timeout,
                )
                .await?;
                stem = format!("{}_en", stem);
                let en_path = out_dir.join(format!("{}.txt", stem));
                fs::write(&en_path, &text).with_context(|| format!("write {}", en_path.display()))?;
                info!(path = %en_path.display(), "translation.saved");
                translated_path = Some(en_path);
            }
        }

        let report = match self.pipeline.analyze(&source, &text).await {
            Ok(report) => report,
            Err(AnalysisError::EmptyInput) => {
                warn!(source = %source, "analysis.empty_input");
                let outcome = AnalyzeOutcome {
                    source,
                    translated_path,
                    summary: None,
                    xlsx: None,
                    json: None,
                };
                return Ok((outcome, None));
            }
            Err(e) => return Err(e.into()),
        };

        let summary = report.summary();
        let files = match report::export(
            &report,
            &out_dir,
            &stem,
            self.output.write_xlsx,
            self.output.write_json,
        )
        .map_err(AnalysisError::from)?
        {
            Export::Ready(files) => files,
            Export::NoData => ExportedFiles {
                xlsx: None,
                json: None,
                records: 0,
            },
        };

        let outcome = AnalyzeOutcome {
            source,
            translated_path,
            summary: (files.records > 0).then_some(summary),
            xlsx: files.xlsx,
            json: files.json,
        };
        Ok((outcome, Some(report)))
    }

    /// Analyze every `*.txt` in `dir`, one file at a time. A file that fails
    /// is logged and skipped. `NoData` when no file produced a record.
    pub async fn analyze_dir(&self, dir: &Path, combined: bool) -> anyhow::Result<Export<BatchOutcome>> {
        let paths = transcript_files(dir)?;
        if paths.is_empty() {
            warn!(dir = %dir.display(), "batch.no_files");
            return Ok(Export::NoData);
        }
        info!(dir = %dir.display(), files = paths.len(), "batch.start");

        let mut files = Vec::with_capacity(paths.len());
        let mut failed = Vec::new();
        let mut reports = Vec::new();
        for path in paths {
            match self.analyze_path(&path).await {
                Ok((outcome, report)) => {
                    files.push(outcome);
                    reports.extend(report);
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(path = %path.display(), error = %reason, "batch.file_failed");
                    failed.push((path, reason));
                }
            }
        }

        let records: usize = reports.iter().map(Report::len).sum();
        info!(
            files = files.len(),
            failed = failed.len(),
            records,
            "batch.completed"
        );
        if records == 0 {
            return Ok(Export::NoData);
        }

        let combined = if combined {
            match report::write_combined(&reports, &self.out_dir(Some(dir))?)
                .map_err(AnalysisError::from)?
            {
                Export::Ready(path) => Some(path),
                Export::NoData => None,
            }
        } else {
            None
        };

        Ok(Export::Ready(BatchOutcome {
            files,
            failed,
            records,
            combined,
        }))
    }
}

/// Whole-document toxicity for one file.
pub async fn score_file(config: &AppConfig, path: &Path) -> anyhow::Result<DocumentToxicity> {
    let client = Arc::new(ServiceClient::from_config(&config.services)?);
    let settings = config.pipeline_settings()?;
    let adapter = build_adapter(config, &client);

    let mut text = read_input(path)?;
    if config.translation.enabled && !text.trim().is_empty() {
        text = translate_to_english(
            client.as_ref(),
            &text,
            config.translation_chunk_size()?,
            config.services.timeout(),
        )
        .await?;
    }

    Ok(score_document(
        &adapter,
        &text,
        settings.chunk_size,
        settings.chunk_policy,
        &settings.thresholds,
    )
    .await?)
}

fn print_batch(batch: &BatchOutcome) {
    for outcome in &batch.files {
        print_outcome(outcome);
        println!();
    }
    for (path, reason) in &batch.failed {
        println!("Failed: {} ({})", path.display(), reason);
    }
    println!(
        "Files: {} analyzed, {} failed, {} records",
        batch.files.len(),
        batch.failed.len(),
        batch.records
    );
    if let Some(p) = &batch.combined {
        println!("Combined spreadsheet: {}", p.display());
    }
}

fn print_outcome(outcome: &AnalyzeOutcome) {
    println!("Source: {}", outcome.source);
    if let Some(p) = &outcome.translated_path {
        println!("English transcript: {}", p.display());
    }
    match &outcome.summary {
        None => println!("No sentences to analyze."),
        Some(s) => {
            println!(
                "Records: {}  NONE={} MILD={} HIGH={} MAX={} ERROR={}",
                s.total, s.none, s.mild, s.high, s.max, s.errors
            );
            if let Some(p) = &outcome.xlsx {
                println!("Spreadsheet: {}", p.display());
            }
            if let Some(p) = &outcome.json {
                println!("JSON: {}", p.display());
            }
        }
    }
}

/// Entry point for the `toxiscan` binary. `args` excludes the program name.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "analyze" => {
            let path = args.get(1).ok_or_else(|| anyhow!("missing input file\n\n{}", USAGE))?;
            let config = load_config(&args)?;
            let outcome = Analyzer::from_config(&config)?.analyze_file(Path::new(path)).await?;
            print_outcome(&outcome);
        }
        "analyze-dir" => {
            let dir = args.get(1).ok_or_else(|| anyhow!("missing input directory\n\n{}", USAGE))?;
            let config = load_config(&args)?;
            let analyzer = Analyzer::from_config(&config)?;
            match analyzer.analyze_dir(Path::new(dir), !has_flag(&args, "--no-combined")).await? {
                Export::Ready(batch) => print_batch(&batch),
                Export::NoData => println!("No analysis results: no transcript produced any sentence."),
            }
        }
        "score" => {
            let path = args.get(1).ok_or_else(|| anyhow!("missing input file\n\n{}", USAGE))?;
            let config = load_config(&args)?;
            match score_file(&config, Path::new(path)).await {
                Ok(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                Err(e) if matches!(e.downcast_ref::<AnalysisError>(), Some(AnalysisError::EmptyInput)) => {
                    println!("Nothing to analyze.");
                }
                Err(e) => return Err(e),
            }
        }
        "config" => {
            let store = config_store(&args)?;
            match args.get(1).map(String::as_str) {
                Some("init") => {
                    let mut config = store.load().map_err(|e| anyhow!(e))?;
                    if let Some(name) = parse_arg_value(&args, "--sensitivity") {
                        let sensitivity = Sensitivity::parse(&name)
                            .ok_or_else(|| anyhow!("unknown sensitivity '{}'", name))?;
                        config.analysis.thresholds = threshold_preset(sensitivity);
                    }
                    store.save(&config).map_err(|e| anyhow!(e))?;
                    println!("Wrote {}", store.config_file().display());
                }
                None | Some("show") => {
                    let config = load_config(&args)?;
                    println!("# {}", store.config_file().display());
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                Some(other) => return Err(anyhow!("unknown config command '{}'\n\n{}", other, USAGE)),
            }
        }
        "-h" | "--help" | "help" => println!("{}", USAGE),
        other => return Err(anyhow!("unknown command '{}'\n\n{}", other, USAGE)),
    }

    Ok(())
}
