use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use boardsync::client::BoardSync;
use boardsync::config::{CliOverrides, Config, default_config_path};

mod cmd;

#[derive(Parser)]
#[command(name = "boardsync")]
#[command(version, about = "Offline-tolerant kanban board client")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to boardsync.toml
    #[arg(long, global = true, env = "BOARDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remote API base URL. Overrides boardsync.toml and BOARDSYNC_API_BASE.
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// SQLite cache file. Overrides boardsync.toml and BOARDSYNC_CACHE_PATH.
    #[arg(long, global = true)]
    pub cache_path: Option<PathBuf>,

    /// Refresh interval in seconds for `watch`
    #[arg(long, global = true)]
    pub refresh_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_base: self.api_base.clone(),
            cache_path: self.cache_path.clone(),
            refresh_secs: self.refresh_secs,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        name: String,
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign out and drop all cached board and notification data
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List boards visible to the signed-in user
    Boards,
    /// Create, rename, delete, share or show a board
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Manage the columns of a board
    Column {
        #[command(subcommand)]
        command: ColumnCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// List notifications or mark them read
    Notifications {
        #[command(subcommand)]
        command: Option<NotificationCommands>,
    },
    /// Fetch boards and notifications once
    Sync,
    /// Keep refreshing in the foreground until interrupted
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    /// Create a board owned by the signed-in user
    Create { name: String },
    Rename { board: String, name: String },
    Delete { board: String },
    /// Add a member by user id or email
    Invite {
        board: String,
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        user: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Print columns and tasks
    Show { board: String },
}

#[derive(Subcommand, Clone)]
pub enum ColumnCommands {
    Add { board: String, title: String },
    Rename { board: String, column: String, title: String },
    Delete { board: String, column: String },
    /// Reorder columns; ids left out keep their relative order at the end
    Reorder {
        board: String,
        #[arg(required = true)]
        order: Vec<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    Create { board: String, column: String, title: String },
    Rename { board: String, task: String, title: String },
    /// Set the description, or clear it when no text is given
    Describe {
        board: String,
        task: String,
        text: Option<String>,
    },
    Delete { board: String, task: String },
    /// Move a task to another column
    Move {
        board: String,
        task: String,
        #[arg(long)]
        to: String,
        /// Position in the destination column; appends when omitted
        #[arg(long)]
        index: Option<usize>,
    },
    /// Replace the tags of a task
    Tags {
        board: String,
        task: String,
        tags: Vec<String>,
    },
    /// Replace the assignees of a task
    Assign {
        board: String,
        task: String,
        users: Vec<String>,
    },
    /// Reorder tasks within a column
    Reorder {
        board: String,
        column: String,
        #[arg(required = true)]
        order: Vec<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum NotificationCommands {
    /// List notifications of the signed-in user
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Mark every notification read
    ReadAll,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default boardsync.toml
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    boardsync::logging::init_tracing(cli.verbose);
    let config_path = cli.config_path();

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&config_path, &cli.overrides(), command.clone());
    }

    let config = Config::load(&config_path, &cli.overrides())?;
    let client = BoardSync::open(&config)?;

    match &cli.command {
        Commands::Login { email, password } => cmd::cmd_login(&client, email, password).await?,
        Commands::Register {
            name,
            email,
            password,
        } => cmd::cmd_register(&client, name, email, password).await?,
        Commands::Logout => cmd::cmd_logout(&client),
        Commands::Whoami => cmd::cmd_whoami(&client),
        Commands::Boards => cmd::cmd_boards(&client).await?,
        Commands::Board { command } => cmd::cmd_board(&client, command.clone()).await?,
        Commands::Column { command } => cmd::cmd_column(&client, command.clone()).await?,
        Commands::Task { command } => cmd::cmd_task(&client, command.clone()).await?,
        Commands::Notifications { command } => {
            cmd::cmd_notifications(&client, command.clone()).await?
        }
        Commands::Sync => cmd::cmd_sync(&client).await?,
        Commands::Watch { duration_secs } => {
            cmd::cmd_watch(&client, config.refresh_interval, *duration_secs).await?
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
