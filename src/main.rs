//! jobboard-chat - terminal messaging client for the job board
//!
//! Employers and candidates exchange messages about a job posting.

mod api;
mod commands;
mod config;
mod messaging;
mod models;
mod realtime;
mod session;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use models::Role;

#[derive(Parser)]
#[command(name = "jobboard-chat")]
#[command(about = "Terminal messaging client for the job board", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a session token issued by the job board
    Login {
        /// Your user id
        #[arg(short, long)]
        user: String,

        /// Your role: employer or candidate
        #[arg(short, long)]
        role: Role,

        /// Bearer token
        #[arg(short, long)]
        token: String,

        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<u64>,

        /// Display name shown in the header
        #[arg(long)]
        name: Option<String>,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show current session status
    Status,

    /// List conversations
    Conversations {
        /// Maximum number of conversations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Read a conversation
    Read {
        /// The other participant's user id
        #[arg(short, long)]
        with: String,

        /// Job posting the conversation is about
        #[arg(short, long)]
        job: String,

        /// Mark the conversation read after printing it
        #[arg(short, long)]
        mark: bool,
    },

    /// Send a message
    Send {
        /// Recipient user id
        #[arg(short, long)]
        to: String,

        /// Job posting the conversation is about
        #[arg(short, long)]
        job: String,

        /// Message content
        message: String,
    },

    /// Mark a conversation read
    MarkRead {
        #[arg(short, long)]
        with: String,

        #[arg(short, long)]
        job: String,
    },

    /// Show unread counts
    Unread,

    /// Listen for incoming messages
    Watch,

    /// Launch the terminal user interface
    Tui,
}

/// Install the tracing subscriber. In TUI mode log lines go to `logs`,
/// since stderr would corrupt the alternate screen.
fn init_logging(verbose: bool, logs: Option<tui::LogBuffer>) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match logs {
        Some(logs) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(logs),
            )
            .init(),
        None => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logs = matches!(cli.command, Commands::Tui).then(tui::LogBuffer::new);
    init_logging(cli.verbose, logs.clone());

    match cli.command {
        Commands::Login {
            user,
            role,
            token,
            expires_in,
            name,
        } => {
            session::login(&user, role, &token, expires_in, name)?;
        }
        Commands::Logout => {
            session::logout()?;
        }
        Commands::Status => {
            session::status()?;
        }
        Commands::Conversations { limit } => {
            tracing::debug!("Fetching conversations...");
            commands::list_conversations(limit).await?;
        }
        Commands::Read { with, job, mark } => {
            commands::read(&with, &job, mark).await?;
        }
        Commands::Send { to, job, message } => {
            tracing::debug!("Sending message...");
            commands::send(&to, &job, &message).await?;
        }
        Commands::MarkRead { with, job } => {
            commands::mark_read(&with, &job).await?;
        }
        Commands::Unread => {
            commands::unread().await?;
        }
        Commands::Watch => {
            commands::watch().await?;
        }
        Commands::Tui => {
            tui::run(logs.unwrap_or_default()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tui_is_dispatched_like_other_commands() {
        let cli = Cli::try_parse_from(["jobboard-chat", "-v", "tui"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Tui));

        let cli =
            Cli::try_parse_from(["jobboard-chat", "read", "-w", "cand", "-j", "7", "--mark"])
                .unwrap();
        match cli.command {
            Commands::Read { with, job, mark } => {
                assert_eq!((with.as_str(), job.as_str(), mark), ("cand", "7", true));
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_login_role_accepts_jobseeker() {
        let cli = Cli::try_parse_from([
            "jobboard-chat", "login", "-u", "c1", "-r", "jobseeker", "-t", "tok",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Login {
                role: Role::Candidate,
                ..
            }
        ));
    }
}
