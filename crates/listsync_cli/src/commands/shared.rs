use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{Duration, Local};
use clap::ValueEnum;
use console::{Term, style};
use listsync::rate_limits::WINDOW;
use listsync::rest::RestClient;
use listsync::sync::{RunEstimate, SyncContextError};
use listsync::{
    ApiRateLimiter, RateLimitedClient, SyncContext, SyncError, SyncMode, SyncOptions, SyncReport,
};

use crate::SyncArgs;
use crate::config::{Config, SyncConfig};
use crate::progress::ProgressReporter;
use crate::shutdown::EXIT_INTERRUPTED;

/// Result type shared by command handlers.
pub(crate) type CommandResult = Result<(), Box<dyn Error>>;

/// Client used by every command.
pub(crate) type ApiClient = RateLimitedClient<RestClient>;

/// Exit status when the daily quota stopped a run (EX_TEMPFAIL).
pub(crate) const EXIT_TEMPFAIL: u8 = 75;

/// Skipped members listed individually before the summary is truncated.
const MAX_SKIPPED_SHOWN: usize = 10;

/// Output format for tabular commands.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Print rows as a rounded table or as a JSON array.
pub(crate) fn print_rows<T>(rows: Vec<T>, format: OutputFormat) -> CommandResult
where
    T: tabled::Tabled + serde::Serialize,
{
    match format {
        OutputFormat::Table => {
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

/// Merge CLI flags over configured defaults.
pub(crate) fn build_sync_options(
    config: &SyncConfig,
    args: &SyncArgs,
    default_mode: SyncMode,
) -> Result<SyncOptions, SyncContextError> {
    let minutes = args.window_minutes.unwrap_or(config.window_minutes);
    let window = Duration::try_minutes(minutes).ok_or_else(|| SyncContextError::InvalidOptions {
        message: format!("window of {minutes} minutes is out of range"),
    })?;

    Ok(SyncOptions {
        mode: args.mode.or(config.mode).unwrap_or(default_mode),
        batch_size: args.batch_size.unwrap_or(config.batch_size),
        window,
        daily_quota: args.daily_quota.unwrap_or(config.daily_quota),
        dry_run: args.dry_run,
    })
}

/// Create a rate limiter unless rate limiting is disabled.
pub(crate) fn maybe_rate_limiter(no_rate_limit: bool, requests: u32) -> Option<ApiRateLimiter> {
    if no_rate_limit {
        None
    } else {
        Some(ApiRateLimiter::per_window(requests, WINDOW))
    }
}

/// Print a warning when rate limiting is disabled (TTY only).
pub(crate) fn warn_no_rate_limit(is_tty: bool) {
    if is_tty {
        eprintln!("Warning: Rate limiting disabled - you may experience API throttling\n");
    }
}

/// Build the REST client from configuration.
pub(crate) fn build_client(config: &Config, no_rate_limit: bool) -> Result<ApiClient, Box<dyn Error>> {
    let token = config
        .api_token()
        .ok_or("No API token configured. Set LISTSYNC_TOKEN or `token` under [api] in the config file")?;
    let rest = RestClient::new(&config.api.base_url, token)?;
    let limiter = maybe_rate_limiter(no_rate_limit, config.api.requests_per_window);
    Ok(RateLimitedClient::with_limiter(rest, limiter))
}

/// Build a sync context wired to a progress reporter and the shutdown flag.
pub(crate) fn build_context(
    config: &Config,
    args: &SyncArgs,
    default_mode: SyncMode,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(SyncContext<ApiClient>, Arc<ProgressReporter>), Box<dyn Error>> {
    let is_tty = Term::stdout().is_term();
    let no_rate_limit = args.no_rate_limit || config.sync.no_rate_limit;
    if no_rate_limit {
        warn_no_rate_limit(is_tty);
    }

    let client = build_client(config, no_rate_limit)?;
    let options = build_sync_options(&config.sync, args, default_mode)?;
    let reporter = Arc::new(ProgressReporter::new());

    let ctx = SyncContext::builder()
        .client(client)
        .options(options)
        .progress(reporter.as_callback())
        .shutdown_flag(shutdown_flag)
        .build()?;

    Ok((ctx, reporter))
}

fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes();
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

fn estimate_line(estimate: &RunEstimate, count: usize) -> String {
    let mut line = format!(
        "Up to {} members in {} batches, about {}",
        count,
        estimate.batches,
        format_duration(estimate.duration)
    );
    if estimate.deferred > 0 {
        line.push_str(&format!(
            " ({} members deferred to later days)",
            estimate.deferred
        ));
    }
    line
}

/// Show how long adding `count` members will take at most.
pub(crate) fn display_estimate(estimate: &RunEstimate, count: usize, is_tty: bool) {
    if estimate.batches == 0 {
        return;
    }

    if is_tty {
        println!("{}", style(estimate_line(estimate, count)).dim());
    } else {
        tracing::info!(
            count,
            batches = estimate.batches,
            batches_today = estimate.batches_today,
            deferred = estimate.deferred,
            minutes = estimate.duration.num_minutes(),
            "Run estimate"
        );
    }
}

/// Summary line for a finished run.
fn summary_line(report: &SyncReport) -> String {
    let (verb, count) = if report.dry_run {
        let eligible = report
            .requested
            .saturating_sub(report.present_before + report.skipped.len());
        ("Would add", eligible)
    } else {
        ("Added", report.added)
    };
    format!(
        "{} {} of {} requested to '{}' ({} already present, {} skipped, {} batches)",
        verb,
        count,
        report.requested,
        report.collection_name,
        report.present_before,
        report.skipped.len(),
        report.batches
    )
}

/// Display the outcome of a sync run.
pub(crate) fn display_report(report: &SyncReport, is_tty: bool) {
    if !is_tty {
        tracing::info!(
            list = %report.collection_name,
            mode = %report.mode,
            requested = report.requested,
            present_before = report.present_before,
            attempted = report.attempted,
            added = report.added,
            skipped = report.skipped.len(),
            batches = report.batches,
            created = report.created,
            destroyed = report.destroyed,
            dry_run = report.dry_run,
            "Sync finished"
        );
        return;
    }

    println!();
    println!("{} {}", style("✓").green().bold(), summary_line(report));

    if !report.skipped.is_empty() {
        println!("  Skipped:");
        for candidate in report.skipped.iter().take(MAX_SKIPPED_SHOWN) {
            println!(
                "    {} {}",
                candidate.user_id,
                style(candidate.eligibility().reason()).dim()
            );
        }
        if report.skipped.len() > MAX_SKIPPED_SHOWN {
            println!(
                "    ... and {} more",
                report.skipped.len() - MAX_SKIPPED_SHOWN
            );
        }
    }
}

/// Exit status for a failed command.
fn exit_status(err: &(dyn Error + 'static)) -> u8 {
    match err.downcast_ref::<SyncError>() {
        Some(SyncError::QuotaExceeded { .. }) => EXIT_TEMPFAIL,
        Some(SyncError::Interrupted { .. }) => EXIT_INTERRUPTED,
        _ => 1,
    }
}

/// Print a failed command and pick its exit status.
pub(crate) fn report_error(err: &(dyn Error + 'static)) -> ExitCode {
    let is_tty = Term::stderr().is_term();

    if let Some(SyncError::QuotaExceeded { resume_at, .. }) = err.downcast_ref::<SyncError>() {
        if is_tty {
            eprintln!(
                "{} Daily quota reached. Run the same command again after {}.",
                style("⏸").yellow(),
                resume_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            );
        } else {
            tracing::warn!(resume_at = %resume_at.to_rfc3339(), "Daily quota reached");
        }
    }

    if is_tty {
        eprintln!("{} {}", style("✗").red().bold(), err);
    } else {
        tracing::error!(error = %err, "Command failed");
    }

    ExitCode::from(exit_status(err))
}
