//! CLI binary for fra-digitizer.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `DigitizerConfig`, runs the pipeline, lets the operator correct fields
//! with `--set`, and exports the record.

use anyhow::{Context, Result};
use clap::Parser;
use fra_digitizer::{
    digitize, export_record, DigitizerConfig, PipelineResult, ProgressCallback, RecordField,
    Stage, StageProgressCallback, StructuredRecord, DEFAULT_EXPORT_FILE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that names the running stage and logs each finished one.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Idle => "Loading document",
        Stage::Extracting => "Extracting text",
        Stage::Normalizing => "Normalizing text",
        Stage::Recognizing => "Recognizing entities",
        Stage::Resolving => "Resolving fields",
        Stage::Structuring => "Structuring record",
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix("Digitizing");
        self.bar.set_message(format!("{}…", stage_label(stage)));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<22}  {}",
            green("✓"),
            stage_label(stage),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_pipeline_failed(&self, stage: Stage, _message: &str) {
        self.bar.println(format!("  {} {}", red("✗"), stage_label(stage)));
        self.bar.finish_and_clear();
    }

    fn on_pipeline_complete(&self, _total_ms: u64) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Digitize a scanned claim form into fra_data.json
  fra2json claim_form.jpg

  # Choose the output file
  fra2json claim_form.pdf -o records/claim_0042.json

  # Correct fields before export (empty value clears the field)
  fra2json claim_form.pdf --set claimStatus=Approved --set coordinates=

  # Print the {success, data|error} envelope instead of the review summary
  fra2json --json claim_form.pdf

  # Print the full trace: extracted text, entities, resolved fields, timings
  fra2json --trace claim_form.pdf > trace.json

  # Use a specific model
  fra2json --provider anthropic --model claude-sonnet-4-20250514 claim_form.pdf

  # Digitize from a URL, writing the record to stdout
  fra2json https://example.org/scans/claim.png -o -

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium, used to render PDF pages
  FRA_*                   Every flag below, e.g. FRA_TEMPERATURE=0

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Digitize:        fra2json claim_form.jpg
"#;

/// Digitize scanned Forest Rights Act claim documents into JSON records.
#[derive(Parser, Debug)]
#[command(
    name = "fra2json",
    version,
    about = "Digitize scanned Forest Rights Act claim documents into JSON records",
    long_about = "Run a scanned FRA claim document (PDF or image; local file, URL or data URI) \
through text extraction, normalization, entity recognition, field resolution and structuring, \
then export the resulting five-field record as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path, HTTP/HTTPS URL, or `data:` URI of a PDF or image.
    input: String,

    /// Export the record to this file (`-` for stdout).
    #[arg(short, long, env = "FRA_OUTPUT", default_value = DEFAULT_EXPORT_FILE)]
    output: PathBuf,

    /// Override a record field before export: `key=value` (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(RecordField, Option<String>)>,

    /// Print the `{success, data|error}` envelope to stdout.
    #[arg(long, env = "FRA_JSON")]
    json: bool,

    /// Print the full pipeline output (intermediate text, entities, timings) to stdout.
    #[arg(long, env = "FRA_TRACE", conflicts_with = "json")]
    trace: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "FRA_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "FRA_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FRA_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per stage.
    #[arg(long, env = "FRA_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Retries per LLM call on provider failure.
    #[arg(long, env = "FRA_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds (0 disables).
    #[arg(long, env = "FRA_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Maximum PDF pages sent to the model.
    #[arg(long, env = "FRA_MAX_PAGES", default_value_t = 10)]
    max_pages: usize,

    /// Longest edge in pixels of a rendered PDF page or converted scan.
    #[arg(long, env = "FRA_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FRA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "FRA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FRA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FRA_QUIET")]
    quiet: bool,
}

/// Parse one `--set key=value`; an empty value clears the field.
fn parse_override(s: &str) -> Result<(RecordField, Option<String>), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let field: RecordField = key.trim().parse()?;
    let value = value.trim();
    Ok((field, (!value.is_empty()).then(|| value.to_string())))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let machine_output = cli.json || cli.trace;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides all the feedback that matters; keep INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !machine_output;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb = spinner
        .clone()
        .map(|cb| cb as Arc<dyn StageProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    // ── Run pipeline ─────────────────────────────────────────────────────
    let mut output = match digitize(&cli.input, &config).await {
        Ok(output) => output,
        Err(e) => {
            // Input errors fail before any stage runs, so the spinner may
            // still be ticking.
            if let Some(ref spinner) = spinner {
                spinner.bar.finish_and_clear();
            }
            let result = PipelineResult::failure(&e);
            if machine_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to serialize result")?
                );
            }
            if let Some(message) = result.error() {
                eprintln!("{} {}", red("✘"), message);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    // ── Operator corrections ─────────────────────────────────────────────
    for (field, value) in &cli.overrides {
        output.record.set(*field, value.clone());
    }

    // ── Export ───────────────────────────────────────────────────────────
    let to_stdout = cli.output.as_os_str() == "-";
    if to_stdout {
        println!(
            "{}",
            serde_json::to_string_pretty(&output.record).context("Failed to serialize record")?
        );
    } else {
        export_record(&output.record, &cli.output)
            .await
            .context("Export failed")?;
    }

    if cli.json {
        let result = PipelineResult::Success {
            data: output.record.clone(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else if cli.trace {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize output")?
        );
    }

    if !cli.quiet && !machine_output {
        print_review(&output.record);
        eprintln!(
            "{}  {}/5 fields  {}ms  →  {}",
            green("✔"),
            output.record.filled_count(),
            output.total_duration_ms,
            bold(&if to_stdout {
                "stdout".to_string()
            } else {
                cli.output.display().to_string()
            }),
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Show the record field by field so the operator can check it before use.
fn print_review(record: &StructuredRecord) {
    eprintln!("{}", bold("Extracted record"));
    for field in RecordField::ALL {
        let value = match record.get(field) {
            Some(v) => v.to_string(),
            None => dim("(empty)"),
        };
        eprintln!("  {:<18} {}", format!("{}:", field.title()), value);
    }
    eprintln!(
        "{}",
        dim("Correct any field with --set key=value and run again.")
    );
}

/// Map CLI args to `DigitizerConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DigitizerConfig> {
    let mut builder = DigitizerConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_pages(cli.max_pages)
        .max_rendered_pixels(cli.max_pixels);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
