//! listsync CLI - keep remote lists in step with a member set.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::Term;
use listsync::{FollowKind, SyncMode};
use tracing_subscriber::EnvFilter;

use crate::commands::shared::OutputFormat;

#[derive(Parser)]
#[command(name = "listsync")]
#[command(version)]
#[command(about = "Synchronize list memberships against a rate-limited social API")]
#[command(
    long_about = "listsync converges a remote list towards a desired set of members. It \
skips accounts that cannot be added (protected, blocking you, blocked by you, unknown), \
adds the rest in verified batches spaced by a wait window, stops at the daily add quota, \
and removes a list it created if the run fails."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync a list with the members in a JSON file (list named after the file):
        $ listsync import friends.json

    Preview the batches without changing anything:
        $ listsync import friends.json --dry-run

    Mirror the accounts a user follows into a fresh list:
        $ listsync followees 12

    Save a list's members in the import format:
        $ listsync export friends -o friends.json

    Save the first 500 followers of a user in the import format:
        $ listsync followers-export 12 --limit 500 -o followers.json

    Show your lists whose name contains "follow":
        $ listsync lists --name follow

    Check the remaining requests of the list endpoints:
        $ listsync limits --resource lists

INPUT FORMAT
    import reads a JSON array of members:
        [{"user_id": "12", "display_name": "jack"}, "783214"]

EXIT STATUS
    0    success
    75   daily quota reached; rerun after the printed time
    130  interrupted
    1    any other error

CONFIGURATION
    listsync reads configuration from:
      1. ~/.config/listsync/config.toml (or $XDG_CONFIG_HOME/listsync/config.toml)
      2. ./listsync.toml
      3. Environment variables (LISTSYNC_ prefix, e.g. LISTSYNC_SYNC__DAILY_QUOTA)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    LISTSYNC_TOKEN            API bearer token
    LISTSYNC_API__BASE_URL    API root (default: https://api.twitter.com/1.1)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a list with the members in a JSON file
    Import {
        /// JSON file with the desired members
        file: PathBuf,

        /// List name (default: the file name without extension)
        #[arg(short, long)]
        list: Option<String>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Mirror the accounts a user follows into a list
    Followees {
        /// User id whose followees are mirrored
        user_id: String,

        /// Only take the first N accounts
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Mirror the accounts following a user into a list
    Followers {
        /// User id whose followers are mirrored
        user_id: String,

        /// Only take the first N accounts
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Write the members of a list as JSON
    Export {
        /// List name
        list: String,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the accounts a user follows as JSON
    FolloweesExport {
        /// User id whose followees are exported
        user_id: String,

        /// Only take the first N accounts
        #[arg(long)]
        limit: Option<usize>,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the accounts following a user as JSON
    FollowersExport {
        /// User id whose followers are exported
        user_id: String,

        /// Only take the first N accounts
        #[arg(long)]
        limit: Option<usize>,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show your lists and their member counts
    Lists {
        /// Only lists with these ids (comma-separated)
        #[arg(long, conflicts_with = "name")]
        id: Option<String>,

        /// Only lists whose name contains one of these (comma-separated)
        #[arg(long)]
        name: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show current rate limit status
    Limits {
        /// Resource families to show, e.g. lists,friends (default: all)
        #[arg(short, long = "resource", value_delimiter = ',')]
        resources: Vec<String>,

        /// Only this endpoint, e.g. /lists/members
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Sync options shared by every sync command.
#[derive(Debug, Clone, Default, clap::Args)]
struct SyncArgs {
    /// "full" destroys and rebuilds the list, "diff" only adds missing members
    #[arg(short, long)]
    mode: Option<SyncMode>,

    /// Members per add call, at most 100 (default from config or 50)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Minutes to wait between batches (default from config or 30)
    #[arg(short, long)]
    window_minutes: Option<i64>,

    /// Successful additions allowed per day (default from config or 100)
    #[arg(short = 'q', long)]
    daily_quota: Option<usize>,

    /// Dry run - show what would be done without making changes
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Disable proactive rate limiting (may cause API throttling)
    #[arg(short = 'R', long)]
    no_rate_limit: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Set up graceful shutdown handler (Ctrl+C)
    let shutdown_flag = shutdown::setup_shutdown_handler();

    // Structured logging only when not attached to a TTY
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("listsync=info,listsync_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            file,
            list,
            sync_opts,
        } => commands::import::handle_import(&file, list, &sync_opts, &config, shutdown_flag).await,
        Commands::Followees {
            user_id,
            limit,
            sync_opts,
        } => {
            commands::follow::handle_follow(
                FollowKind::Followees,
                &user_id,
                limit,
                &sync_opts,
                &config,
                shutdown_flag,
            )
            .await
        }
        Commands::Followers {
            user_id,
            limit,
            sync_opts,
        } => {
            commands::follow::handle_follow(
                FollowKind::Followers,
                &user_id,
                limit,
                &sync_opts,
                &config,
                shutdown_flag,
            )
            .await
        }
        Commands::Export { list, output } => {
            commands::export::handle_export(&list, output, &config).await
        }
        Commands::FolloweesExport {
            user_id,
            limit,
            output,
        } => {
            commands::export::handle_follow_export(
                FollowKind::Followees,
                &user_id,
                limit,
                output,
                &config,
                shutdown_flag,
            )
            .await
        }
        Commands::FollowersExport {
            user_id,
            limit,
            output,
        } => {
            commands::export::handle_follow_export(
                FollowKind::Followers,
                &user_id,
                limit,
                output,
                &config,
                shutdown_flag,
            )
            .await
        }
        Commands::Lists { id, name, output } => {
            commands::lists::handle_lists(id.as_deref(), name.as_deref(), output, &config).await
        }
        Commands::Limits {
            resources,
            endpoint,
            output,
        } => commands::limits::handle_limits(&resources, endpoint.as_deref(), output, &config).await,
        Commands::Completions { shell, output } => {
            commands::meta::handle_completions(shell, output)
        }
        Commands::Man { output } => commands::meta::handle_man(output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => commands::shared::report_error(err.as_ref()),
    }
}
