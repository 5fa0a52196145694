use anyhow::Result;
use clap::{Parser, Subcommand};

use ghcs::account::Role;
use ghcs::address::Address;
use ghcs::issuance::IssuanceAction;
use ghcs::ledger::BackendKind;
use ghcs::{commands, config, telemetry};

#[derive(Parser)]
#[command(name = "ghcs")]
#[command(about = "Green hydrogen credit ledger", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.ghcs/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Acting user for role-checked commands
    #[arg(long = "as", global = true, value_name = "NAME")]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a config and the genesis state
    Init {
        /// Ledger backend (simulated or contract)
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Show ledger and workflow status
    Status,

    /// Show an account's balance
    Balance { account: String },

    /// Show an account's transactions, newest first
    History {
        account: String,

        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Append a raw transaction (no balance check)
    Submit {
        sender: String,
        recipient: String,
        amount: u64,

        #[arg(long, default_value = "")]
        details: String,
    },

    /// Seal pending transactions into a block
    Seal,

    /// Buy credits from a seller as the acting factory
    Purchase { seller: String, amount: u64 },

    /// Issuance requests
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Freeze or unfreeze an account (government only)
    Freeze {
        account: String,

        /// Lift the freeze instead
        #[arg(long)]
        unfreeze: bool,
    },

    /// Set an account's quota (government only)
    Quota { account: String, amount: u64 },

    /// Register a new user
    Register {
        name: String,
        role: Role,

        /// Contract address (derived from the name when omitted)
        #[arg(long)]
        address: Option<Address>,

        /// Production capacity for producers
        #[arg(long)]
        capacity: Option<u64>,
    },

    /// Re-check ledger integrity
    Verify,

    /// Move balances from the simulated chain onto a new contract deployment
    Migrate,
}

#[derive(Subcommand)]
enum IssueCommands {
    /// Request new credits as the acting producer
    Request { amount: u64 },

    /// Certify, scrutinize or reject a request
    Decide {
        /// Request id, e.g. ISSUE-1
        id: String,
        action: IssuanceAction,
    },

    /// List requests awaiting a decision
    List {
        /// Only requests escalated for government review
        #[arg(long)]
        escalated: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    // Use the configured level when a config exists; init has none yet.
    let level = config::Config::load_with_env(&config_path)
        .map(|c| c.logging.level)
        .unwrap_or_default();
    telemetry::init_tracing(&level, cli.verbose)?;

    let actor = cli.actor.as_deref();

    match cli.command {
        Commands::Init { backend } => commands::init::run(&config_path, backend),
        Commands::Status => commands::status::run(&config_path),
        Commands::Balance { account } => commands::balance::run(&config_path, &account),
        Commands::History { account, limit } => {
            commands::balance::history(&config_path, &account, limit)
        }
        Commands::Submit {
            sender,
            recipient,
            amount,
            details,
        } => commands::send::submit(&config_path, &sender, &recipient, amount, &details),
        Commands::Seal => commands::seal::run(&config_path),
        Commands::Purchase { seller, amount } => {
            commands::send::purchase(&config_path, actor, &seller, amount)
        }
        Commands::Issue { command } => match command {
            IssueCommands::Request { amount } => {
                commands::issue::request(&config_path, actor, amount)
            }
            IssueCommands::Decide { id, action } => {
                commands::issue::decide(&config_path, actor, &id, action)
            }
            IssueCommands::List { escalated } => commands::issue::list(&config_path, escalated),
        },
        Commands::Freeze { account, unfreeze } => {
            commands::admin::freeze(&config_path, actor, &account, !unfreeze)
        }
        Commands::Quota { account, amount } => {
            commands::admin::quota(&config_path, actor, &account, amount)
        }
        Commands::Register {
            name,
            role,
            address,
            capacity,
        } => commands::admin::register(&config_path, &name, role, address, capacity),
        Commands::Verify => commands::verify::run(&config_path),
        Commands::Migrate => commands::migrate::run(&config_path),
    }
}
