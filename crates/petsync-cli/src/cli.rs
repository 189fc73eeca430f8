use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "petsync")]
#[command(about = "Keep pet records offline and sync them when the network is back")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for API and auth configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a pet record offline
    #[command(alias = "new")]
    Add(PetFields),
    /// Change fields of a pet record
    Update {
        /// Pet ID or unique ID prefix
        id: String,
        #[command(flatten)]
        fields: PetFields,
    },
    /// Delete a pet record
    Delete {
        /// Pet ID or unique ID prefix
        id: String,
    },
    /// List local pet records
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show mutations waiting to be pushed
    Outbox {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push queued mutations to the server
    Push,
    /// Pull remote changes into local records
    Pull {
        /// Ignore the pull throttle
        #[arg(long)]
        force: bool,
    },
    /// Push, then pull
    Sync,
    /// Keep syncing in the foreground until interrupted
    Watch,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the API token for a profile
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Pet attributes settable from the command line
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct PetFields {
    /// Pet name
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub species: Option<String>,
    #[arg(long)]
    pub breed: Option<String>,
    #[arg(long)]
    pub sex: Option<String>,
    /// Weight in kg; `,` or `.` as decimal separator
    #[arg(long)]
    pub weight: Option<String>,
    /// Extra field as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub extra: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Sync API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Device id sent with every push (generated when omitted)
        #[arg(long, value_name = "ID")]
        device_id: Option<String>,
        /// Seconds between background pushes in `watch`
        #[arg(long, value_name = "SECS")]
        push_interval_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved sync configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an API token in the keychain
    Login {
        /// API token; read from stdin when omitted
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
    },
    /// Show whether a token is stored for the profile
    Status,
    /// Remove the stored token
    Logout,
}
