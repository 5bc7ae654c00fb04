use std::path::{Path, PathBuf};

mod report;
mod terminal;

use anyhow::Context;
use chrono::Utc;
use clap::ArgAction;
use cohort::{Config, Outcome, Renewal, RunOptions, renewal::survey};
use report::{OutputFormat, Report};
use terminal::Colorize;
use tracing::instrument;

/// Configuration read when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "/etc/cohort-renew/config.toml";

/// Exit status when the operator declines the renewal.
const CANCELLED: i32 = 130;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Also report up-to-date certificates (-v, -vv, -vvv raise log detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print the renewal request without executing it or reloading services
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Renew without asking for confirmation
    #[arg(long)]
    cron: bool,

    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

impl Cli {
    pub fn run(self, unrecognised: &[String]) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        for arg in unrecognised {
            tracing::warn!("Ignoring unrecognised argument '{arg}'");
        }

        let config = load_config(self.config.as_deref())?;
        self.renew(&config)
    }

    #[instrument(level = "debug", skip_all)]
    fn renew(&self, config: &Config) -> anyhow::Result<()> {
        let plan = survey(config, Utc::now()).with_context(|| {
            format!(
                "Cannot read configured sites from {}",
                config.sites_directory.display()
            )
        })?;

        let report = Report::new(&plan, self.verbose > 0);
        if self.output == OutputFormat::Table {
            report.print_table();
        }

        let options = RunOptions {
            dry_run: self.dry_run,
            cron: self.cron,
        };
        let outcome = Renewal::from_config(config).run(&plan, options);

        if self.output == OutputFormat::Json {
            report.write_json(std::io::stdout().lock(), outcome.as_ref().ok())?;
        }

        match outcome? {
            Outcome::UpToDate => {
                if self.output == OutputFormat::Table {
                    println!("{}", "✅ All certificates are up to date.".success());
                }
            }
            Outcome::DryRun(request) => {
                if self.output == OutputFormat::Table {
                    println!("Would run:");
                    println!(
                        "  {}",
                        format!("{} {request}", config.issuance_binary.display()).info()
                    );
                    report.print_deferred();
                }
            }
            Outcome::Aborted(_) => {
                eprintln!("Cancelled");
                std::process::exit(CANCELLED);
            }
            Outcome::Renewed { request, reloaded } => {
                if self.output == OutputFormat::Table {
                    println!(
                        "{}",
                        format!("✅ Renewed certificate for {}", request.base_domain()).success()
                    );
                    if !reloaded.is_empty() {
                        println!("  Reloaded {}", reloaded.join(", ").dim());
                    }
                    report.print_deferred();
                }
            }
        }

        Ok(())
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        return Ok(Config::load(path)?);
    }

    let path = Path::new(DEFAULT_CONFIG_PATH);
    match Config::load(path) {
        Ok(config) => Ok(config),
        Err(e) if !path.exists() => {
            tracing::debug!("Using default configuration: {e}");
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Options taking a value in the following argument.
const VALUE_OPTIONS: &[&str] = &["--config", "--output"];
/// Recognised options without a value.
const FLAG_OPTIONS: &[&str] = &["--verbose", "--dry-run", "--cron", "--help", "--version"];
/// Recognised short flags without a value.
const SHORT_FLAGS: &str = "vnhV";
/// Recognised short options taking a value.
const SHORT_VALUE_OPTIONS: &str = "c";

/// Separate arguments the CLI understands from those it does not.
///
/// Unknown arguments are returned separately so they can be reported instead
/// of aborting the run. The program name is kept as the first argument.
pub fn split_unrecognised<I>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut known: Vec<String> = args.next().into_iter().collect();
    let mut unknown = Vec::new();

    while let Some(arg) = args.next() {
        let takes_value = if let Some(long) = arg.strip_prefix("--").filter(|s| !s.is_empty()) {
            let (name, inline_value) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            let name = format!("--{name}");
            if VALUE_OPTIONS.contains(&name.as_str()) {
                Some(!inline_value)
            } else if FLAG_OPTIONS.contains(&name.as_str()) && !inline_value {
                Some(false)
            } else {
                None
            }
        } else if let Some(short) = arg
            .strip_prefix('-')
            .filter(|s| !s.is_empty() && !s.starts_with('-'))
        {
            short_cluster(short)
        } else {
            None
        };

        match takes_value {
            Some(needs_next) => {
                known.push(arg);
                if needs_next {
                    if let Some(value) = args.next() {
                        known.push(value);
                    }
                }
            }
            None => unknown.push(arg),
        }
    }

    (known, unknown)
}

/// Classify a cluster of short options such as `vn` or `cPATH`.
///
/// Returns whether the following argument is consumed as a value, or `None`
/// if the cluster contains an unknown option.
fn short_cluster(cluster: &str) -> Option<bool> {
    for (index, c) in cluster.char_indices() {
        if SHORT_VALUE_OPTIONS.contains(c) {
            // the rest of the cluster is the value, if any
            return Some(index + c.len_utf8() == cluster.len());
        }
        if !SHORT_FLAGS.contains(c) {
            return None;
        }
    }
    Some(false)
}
