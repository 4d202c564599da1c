//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use meetingorder_capture::CalendarSource;
use meetingorder_core::pipeline::{
    MeetingSource, OracleOutcome, ProgressReporter, ReconcileConfig, ReconcileResult,
};
use meetingorder_core::{pipeline, report};
use meetingorder_oracle::OracleClient;
use meetingorder_shared::{AppConfig, init_config, load_config, load_config_from, resolve_api_key};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MeetingOrder: match calendar meetings to work orders.
#[derive(Parser)]
#[command(
    name = "meetingorder",
    version,
    about = "Match calendar meetings to billable work orders and export timed results to CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.meetingorder/meetingorder.toml).
    #[arg(long, global = true, env = "MEETINGORDER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Read meetings from a calendar screenshot and match them.
    Screenshot {
        /// Screenshot image (PNG or JPEG).
        path: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Scrape meetings from the calendar page and match them.
    Scrape {
        /// Saved HTML snapshot of the calendar week view.
        #[arg(long, conflicts_with = "url")]
        snapshot: Option<PathBuf>,

        /// Calendar page URL (defaults to the configured calendar URL).
        #[arg(long)]
        url: Option<Url>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Re-run match recovery over a saved oracle response.
    Recover {
        /// File holding the raw oracle response text.
        file: PathBuf,

        /// Also export the recovered matches to this CSV file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides of the configured paths and oracle settings.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Work-order CSV file.
    #[arg(short, long)]
    pub workorders: Option<PathBuf>,

    /// Export destination.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Model for the match request.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output token ceiling for oracle calls.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Save the raw match response, for replay with `recover`.
    #[arg(long)]
    pub save_response: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut ReconcileConfig) {
        if let Some(path) = &self.workorders {
            config.workorders_path = path.clone();
        }
        if let Some(path) = &self.out {
            config.output_path = path.clone();
        }
        if let Some(model) = &self.model {
            config.match_model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "meetingorder=info",
        1 => "meetingorder=debug",
        _ => "meetingorder=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Screenshot { path, run } => {
            let config = read_config(config_path.as_deref())?;
            cmd_reconcile(&config, MeetingSource::Screenshot(path), &run).await
        }
        Command::Scrape { snapshot, url, run } => {
            let config = read_config(config_path.as_deref())?;
            let source = match (snapshot, url) {
                (Some(path), _) => CalendarSource::Snapshot(path),
                (None, Some(url)) => CalendarSource::Live(url),
                (None, None) => {
                    let url = Url::parse(&config.calendar.url).wrap_err_with(|| {
                        format!("invalid calendar url '{}'", config.calendar.url)
                    })?;
                    CalendarSource::Live(url)
                }
            };
            cmd_reconcile(&config, MeetingSource::Calendar(source), &run).await
        }
        Command::Recover { file, out } => cmd_recover(&file, out.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn read_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_reconcile(config: &AppConfig, source: MeetingSource, args: &RunArgs) -> Result<()> {
    // Resolve the key before any capture work
    let api_key = resolve_api_key(config)?;
    let oracle = OracleClient::from_config(&config.oracle, api_key)?;

    let mut reconcile_config = ReconcileConfig::from(config);
    args.apply(&mut reconcile_config);

    info!(
        workorders = %reconcile_config.workorders_path.display(),
        out = %reconcile_config.output_path.display(),
        model = %reconcile_config.match_model,
        "reconciling meetings"
    );

    let reporter = CliProgress::new();
    let result = pipeline::reconcile(&reconcile_config, &source, &oracle, &reporter).await?;

    if let (Some(path), Some(raw)) = (&args.save_response, &result.raw_response) {
        std::fs::write(path, raw)
            .wrap_err_with(|| format!("failed to save oracle response to {}", path.display()))?;
        info!(path = %path.display(), "oracle response saved");
    }

    print_result(&result);
    Ok(())
}

fn print_result(result: &ReconcileResult) {
    println!();
    print!("{}", report::render_console(&result.matches));

    if !result.skipped.is_empty() {
        println!();
        println!("Skipped {} malformed match record(s):", result.skipped.len());
        for skipped in &result.skipped {
            println!("  #{}: {}", skipped.index, skipped.defect);
        }
    }
    if !result.dropped_lines.is_empty() {
        println!();
        println!("Ignored {} unreadable meeting line(s):", result.dropped_lines.len());
        for line in &result.dropped_lines {
            println!("  {line}");
        }
    }

    match &result.outcome {
        OracleOutcome::TransportFailed(msg) => println!("\nOracle request failed: {msg}"),
        OracleOutcome::Unrecoverable(msg) => println!("\nOracle response unusable: {msg}"),
        OracleOutcome::NoMeetings | OracleOutcome::Recovered { .. } => {}
    }

    match &result.exported {
        Some(path) => println!("\nProcess completed. Results exported to {}", path.display()),
        None => println!(
            "\nNo data to export. Please check the oracle response and ensure meetings and \
             work orders are being correctly processed."
        ),
    }
    println!("Time: {:.1}s", result.elapsed.as_secs_f64());
}

fn cmd_recover(file: &Path, out: Option<&Path>) -> Result<()> {
    let recovered = pipeline::recover_file(file)?;

    print!("{}", report::render_console(&recovered.records));
    if recovered.repaired {
        println!("\n(response was truncated; trailing incomplete record dropped)");
    }
    for skipped in &recovered.skipped {
        println!("Skipped #{}: {}", skipped.index, skipped.defect);
    }

    if let Some(out) = out {
        if report::export_csv(&recovered.records, out)? {
            println!("\nResults exported to {}", out.display());
        } else {
            println!("\nNo data to export.");
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = read_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &ReconcileResult) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    // A run that fails with an error never reaches `done`.
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn spinner_stops_when_reporter_is_dropped() {
        let progress = CliProgress::new();
        progress.spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        progress.phase("Reading screenshot");
        let spinner = progress.spinner.clone();

        drop(progress);
        assert!(spinner.is_finished());
    }

    #[test]
    fn screenshot_with_overrides() {
        let cli = Cli::try_parse_from([
            "meetingorder",
            "-vv",
            "screenshot",
            "week.png",
            "--workorders",
            "wo.csv",
            "--max-tokens",
            "1200",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let Command::Screenshot { path, run } = cli.command else {
            panic!("expected screenshot command");
        };
        assert_eq!(path, PathBuf::from("week.png"));

        let mut config = ReconcileConfig::from(&AppConfig::default());
        run.apply(&mut config);
        assert_eq!(config.workorders_path, PathBuf::from("wo.csv"));
        assert_eq!(config.max_tokens, 1200);
        assert_eq!(config.output_path, PathBuf::from("meetingorder.csv"));
        assert_eq!(config.match_model, "gpt-4o-mini");
    }

    #[test]
    fn scrape_sources_are_exclusive() {
        let result = Cli::try_parse_from([
            "meetingorder",
            "scrape",
            "--snapshot",
            "week.html",
            "--url",
            "https://outlook.office.com/calendar/",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "meetingorder",
            "recover",
            "response.txt",
            "--log-format",
            "json",
            "--config",
            "alt.toml",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }
}
