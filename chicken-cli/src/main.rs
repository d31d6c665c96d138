mod commands;
mod config;

use chicken_core::CoreError;
use chicken_pool::PoolError;
use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chicken")]
#[command(about = "Last-bettor-wins escrow pool")]
#[command(version)]
struct Cli {
    /// Data directory for the pool database
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new pool
    Init {
        /// Account allowed to change rake and settle reward
        #[arg(long)]
        owner: String,
        /// Account receiving the rake
        #[arg(long)]
        vault: String,
        /// Exact bet size in units
        #[arg(long)]
        bet_size: Option<u64>,
        /// Seconds without a bet before a round can be settled
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Rake in basis points
        #[arg(long)]
        rake_bps: Option<u16>,
        /// Reward paid to the settler, in units
        #[arg(long)]
        settle_reward: Option<u64>,
        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },
    /// Credit units to an account
    Fund {
        account: String,
        amount: u64,
    },
    /// Show account balances
    Balance {
        /// Account to show, all accounts if omitted
        account: Option<String>,
    },
    /// Place a bet
    Bet {
        /// Pool ID or unique prefix
        pool: String,
        /// Betting account
        bettor: String,
        /// Amount in units, defaults to the pool's bet size
        #[arg(long)]
        amount: Option<u64>,
    },
    /// Settle a finished round
    Settle {
        /// Pool ID or unique prefix
        pool: String,
        /// Account receiving the settle reward
        settler: String,
    },
    /// Show pool status
    Status {
        /// Pool ID or unique prefix
        pool: String,
    },
    /// List pools
    List,
    /// Change the rake (owner only)
    SetRake {
        pool: String,
        caller: String,
        bps: u16,
    },
    /// Change the settle reward (owner only)
    SetReward {
        pool: String,
        caller: String,
        amount: u64,
    },
    /// Hand pool ownership to another account (owner only)
    TransferOwner {
        pool: String,
        caller: String,
        new_owner: String,
    },
    /// Show recent pool events
    History {
        pool: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Settle rounds automatically as they finish
    Watch {
        pool: String,
        /// Account receiving settle rewards
        settler: String,
        #[arg(long, default_value_t = 1)]
        poll_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CliConfig::resolve(cli.data_dir, cli.verbose);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_filter()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ctx = commands::Context::open(&config).await?;

    let result = match cli.command {
        Commands::Init {
            owner,
            vault,
            bet_size,
            interval_secs,
            rake_bps,
            settle_reward,
            yes,
        } => {
            let args = commands::InitArgs {
                owner,
                vault,
                bet_size,
                interval_secs,
                rake_bps,
                settle_reward,
                yes,
            };
            commands::init_pool(&ctx, args).await
        }
        Commands::Fund { account, amount } => commands::fund(&ctx, &account, amount).await,
        Commands::Balance { account } => commands::show_balance(&ctx, account.as_deref()).await,
        Commands::Bet {
            pool,
            bettor,
            amount,
        } => commands::place_bet(&ctx, &pool, &bettor, amount).await,
        Commands::Settle { pool, settler } => commands::settle(&ctx, &pool, &settler).await,
        Commands::Status { pool } => commands::show_status(&ctx, &pool).await,
        Commands::List => commands::list_pools(&ctx).await,
        Commands::SetRake { pool, caller, bps } => {
            commands::set_rake(&ctx, &pool, &caller, bps).await
        }
        Commands::SetReward {
            pool,
            caller,
            amount,
        } => commands::set_reward(&ctx, &pool, &caller, amount).await,
        Commands::TransferOwner {
            pool,
            caller,
            new_owner,
        } => commands::transfer_owner(&ctx, &pool, &caller, &new_owner).await,
        Commands::History { pool, limit } => commands::show_history(&ctx, &pool, limit).await,
        Commands::Watch {
            pool,
            settler,
            poll_secs,
        } => commands::watch(&ctx, &pool, &settler, poll_secs).await,
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}

fn report(e: &anyhow::Error) {
    match e.downcast_ref::<PoolError>() {
        Some(PoolError::WrongBetAmount { expected, got }) => {
            eprintln!("Error: Bet must be exactly {} units, got {}", expected, got);
        }
        Some(PoolError::RoundClosed) => {
            eprintln!("Error: Round is closed to new bets");
            eprintln!("Use 'chicken settle <pool> <settler>' to pay out the round");
        }
        Some(PoolError::InsufficientFunds { need, available }) => {
            eprintln!("Error: Insufficient funds");
            eprintln!("Need: {} units, Available: {} units", need, available);
        }
        Some(PoolError::RoundInProgress) => {
            eprintln!("Error: Round cannot be settled yet");
            eprintln!("Use 'chicken status <pool>' to see when it can be");
        }
        Some(PoolError::Unauthorized { caller }) => {
            eprintln!("Error: '{}' is not allowed to do that", caller);
        }
        _ => match e.downcast_ref::<CoreError>() {
            Some(CoreError::PoolNotFound { id }) => {
                eprintln!("Error: Pool '{}' not found", id);
                eprintln!("Use 'chicken list' to see available pools");
            }
            _ => eprintln!("Error: {:#}", e),
        },
    }
}
