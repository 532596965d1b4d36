//! CLI binary for bilancio-agent.
//!
//! `bilancio serve` runs the upload web app; `bilancio generate` runs the
//! pipeline once from the terminal. Both are thin shims that map flags to
//! the library's config types.

use anyhow::{Context, Result};
use bilancio_agent::config::API_KEY_FILE;
use bilancio_agent::server::{self, PipelineEngine};
use bilancio_agent::{
    generate_balance_sheet, load_api_key_file, write_outputs, ApiKeySource,
    GenerationProgressCallback, GeneratorConfig, ProgressCallback, ServerConfig, Stage,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the PDFs are rendered, then a four-step bar for the stages.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(Stage::ALL.len() as u64);
        self.bar.set_style(style);
        self.bar.reset_elapsed();
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, documents: usize, total_pages: usize) {
        self.activate_bar();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Analysing {documents} document(s), {total_pages} page(s)…"
            ))
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(format!("Phase {}/4", stage.number()));
        self.bar.set_message(stage.title());
    }

    fn on_stage_complete(&self, stage: Stage, output_len: usize, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} Phase {}/4  {:<28}  {:<12}  {}",
            green("✓"),
            stage.number(),
            stage.title(),
            dim(&format!("{output_len:>6} chars")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_stage_warning(&self, stage: Stage, message: &str) {
        self.bar.println(format!(
            "  {} {}: {}",
            yellow("⚠"),
            stage.title(),
            yellow(message)
        ));
    }

    fn on_generation_complete(&self, text_len: usize, duration_ms: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Balance sheet ready: {} chars in {:.1}s",
            green("✔"),
            bold(&text_len.to_string()),
            duration_ms as f64 / 1000.0
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the web app on port 5000
  bilancio serve

  # Custom port and directories
  PORT=8080 bilancio serve --upload-dir /tmp/uploads --output-dir /srv/bilanci

  # Generate from the terminal
  bilancio generate bilancio_2024.pdf note_2024.pdf -o bilancio_completo.pdf

  # Full pipeline output as JSON
  bilancio generate --json statements.pdf > result.json

  # Other provider / models
  bilancio generate --provider openai --fast-model gpt-4.1-mini --deep-model gpt-4.1 in.pdf

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (falls back to ./anthropic_api_key.txt)
  BILANCIO_LLM_PROVIDER   Provider (anthropic, openai, gemini, mistral, ollama)
  BILANCIO_FAST_MODEL     Model for analysis, validation and formatting
  BILANCIO_DEEP_MODEL     Model for extraction
  PORT, HOST              Web server bind address
  UPLOAD_DIR, OUTPUT_DIR  Web server directories
  PDFIUM_DYNAMIC_LIB_PATH Directory containing libpdfium
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Generate Italian balance sheets from PDF financial statements.
#[derive(Parser, Debug)]
#[command(
    name = "bilancio",
    version,
    about = "Generate Italian balance sheets (bilancio d'esercizio) from PDF statements",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BILANCIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BILANCIO_QUIET")]
    quiet: bool,

    /// File read into ANTHROPIC_API_KEY when the variable is unset.
    #[arg(long, global = true, env = "BILANCIO_API_KEY_FILE", default_value = API_KEY_FILE)]
    api_key_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the upload web app.
    Serve(ServeArgs),
    /// Generate a balance sheet from PDF files or URLs.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM provider: anthropic, openai, gemini, mistral, ollama.
    #[arg(long, env = "BILANCIO_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model for the analysis, validation and formatting stages.
    #[arg(long, env = "BILANCIO_FAST_MODEL")]
    fast_model: Option<String>,

    /// Model for the extraction stage.
    #[arg(long, env = "BILANCIO_DEEP_MODEL")]
    deep_model: Option<String>,

    /// Retries per stage on provider failure.
    #[arg(long, env = "BILANCIO_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "BILANCIO_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// HTTP download timeout for URL inputs, in seconds.
    #[arg(long, env = "BILANCIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Directory for uploaded statements.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for generated PDF and text files.
    #[arg(long, env = "OUTPUT_DIR", default_value = "outputs")]
    output_dir: PathBuf,

    /// Files accepted per upload.
    #[arg(long, env = "BILANCIO_MAX_FILES", default_value_t = 5)]
    max_files: usize,

    /// Per-file size limit in MB.
    #[arg(long, env = "BILANCIO_MAX_FILE_SIZE_MB", default_value_t = 10)]
    max_file_size_mb: u64,

    /// Idle session lifetime in seconds.
    #[arg(long, env = "BILANCIO_SESSION_TTL", default_value_t = 3600)]
    session_ttl: u64,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Local PDF paths or HTTP/HTTPS URLs (at most 5).
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<String>,

    /// Where to write the formatted PDF.
    #[arg(short, long, default_value = "bilancio_completo.pdf")]
    output: PathBuf,

    /// Where to write the plain-text balance sheet.
    #[arg(long, default_value = "bilancio_output.txt")]
    text: PathBuf,

    /// Print the full pipeline output (all stages, stats) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "BILANCIO_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    model: ModelArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs for `generate`.
    let show_progress = match &cli.command {
        Command::Generate(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
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

    // Must happen before the runtime spawns worker threads.
    if let ApiKeySource::File(path) = load_api_key_file(&cli.api_key_file) {
        if !cli.quiet && !show_progress {
            eprintln!("{} Loaded API key from {}", green("✓"), path.display());
        }
    }

    let quiet = cli.quiet;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Serve(args) => run_serve(args, quiet).await,
            Command::Generate(args) => run_generate(args, quiet, show_progress).await,
        }
    })
}

/// Map the shared model flags onto a `GeneratorConfig`.
fn build_config(model: &ModelArgs, progress: Option<ProgressCallback>) -> Result<GeneratorConfig> {
    let mut builder = GeneratorConfig::builder()
        .max_retries(model.max_retries)
        .api_timeout_secs(model.api_timeout)
        .download_timeout_secs(model.download_timeout);

    if let Some(ref p) = model.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref m) = model.fast_model {
        builder = builder.fast_model(m);
    }
    if let Some(ref m) = model.deep_model {
        builder = builder.deep_model(m);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn run_serve(args: ServeArgs, quiet: bool) -> Result<()> {
    let generator = build_config(&args.model, None)?;
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        upload_dir: args.upload_dir,
        output_dir: args.output_dir,
        max_files: args.max_files,
        max_file_size: args.max_file_size_mb.saturating_mul(1024 * 1024),
        session_ttl_secs: args.session_ttl,
    };

    if !quiet {
        eprintln!("{}", "=".repeat(70));
        eprintln!("{}", bold("Bilancio web app starting"));
        eprintln!("{}", "=".repeat(70));
        eprintln!("  Upload folder:  {}", config.upload_dir.display());
        eprintln!("  Output folder:  {}", config.output_dir.display());
        eprintln!("  Max files:      {}", config.max_files);
        eprintln!("  Max file size:  {:.0}MB", config.max_file_size_mb());
        eprintln!(
            "  Open:           {}",
            cyan(&format!("http://localhost:{}", config.port))
        );
        eprintln!("{}", "=".repeat(70));
    }

    let engine = Arc::new(PipelineEngine::for_server(generator, &config));
    server::serve(config, engine).await.context("Web server failed")
}

async fn run_generate(args: GenerateArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &args.model,
        progress
            .as_ref()
            .map(|cb| Arc::clone(cb) as ProgressCallback),
    )?;

    let output = match generate_balance_sheet(args.inputs.as_slice(), &config).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(ref cb) = progress {
                cb.bar.finish_and_clear();
            }
            return Err(e).context("Balance sheet generation failed");
        }
    };

    let today = chrono::Local::now().date_naive();
    write_outputs(&output.text, &args.output, &args.text, today)
        .await
        .context("Failed to write output files")?;

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    eprintln!();
    eprintln!("{}", bold("Preview (first 30 lines):"));
    eprintln!("{}", dim(&"─".repeat(70)));
    println!("{}", output.preview(30));
    eprintln!("{}", dim(&"─".repeat(70)));

    for (stage, warning) in output.warnings() {
        eprintln!("{} {}: {}", yellow("⚠"), stage.title(), warning);
    }
    eprintln!(
        "{}  PDF   →  {}",
        green("✔"),
        bold(&args.output.display().to_string())
    );
    eprintln!(
        "{}  Text  →  {}",
        green("✔"),
        bold(&args.text.display().to_string())
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out, {}ms total",
        dim(&output.stats.total_input_tokens.to_string()),
        dim(&output.stats.total_output_tokens.to_string()),
        output.stats.total_duration_ms,
    );

    Ok(())
}
