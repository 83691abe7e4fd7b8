#![forbid(unsafe_code)]
//! Command-line entry point: fund accounts through the minion pool

use clap::{Parser, Subcommand};
use friendbot::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use friendbot::crypto::KeyPair;
use friendbot::ledger::{HttpLedgerClient, InMemoryLedger, LedgerClient};
use friendbot::minion::{BotAccount, Minion, SubmitResult};
use friendbot::pool::MinionPool;
use friendbot::transaction::parse_amount;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "friendbot", about = "Funds new ledger accounts", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and fund each destination account
    Fund {
        /// Destination account ids
        #[arg(required = true)]
        destinations: Vec<String>,

        /// Run against an in-process ledger seeded with the configured accounts
        #[arg(long)]
        in_memory: bool,
    },
    /// Print fresh key pairs for config files
    Keygen {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

fn build_ledger(
    config: &Config,
    in_memory: bool,
) -> Result<Arc<dyn LedgerClient>, Box<dyn std::error::Error>> {
    if !in_memory {
        let client = HttpLedgerClient::new(&config.network.ledger_url, config.request_timeout())?;
        return Ok(Arc::new(client));
    }

    let ledger =
        InMemoryLedger::new(&config.network.passphrase).with_base_fee(config.funding.base_fee);
    ledger.create_genesis_account(
        config.bot_keypair()?.account_id(),
        parse_amount("100000000")?,
    );
    for keypair in config.minion_keypairs()? {
        ledger.create_genesis_account(keypair.account_id(), parse_amount("100")?);
    }
    info!("using in-memory ledger");
    Ok(Arc::new(ledger))
}

async fn fund(
    config: Config,
    destinations: Vec<String>,
    in_memory: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let ledger = build_ledger(&config, in_memory)?;
    let bot = Arc::new(BotAccount::new(config.bot_keypair()?));
    info!(bot = %bot.id(), ledger = %config.network.ledger_url, "starting friendbot");

    let minions = config
        .minion_keypairs()?
        .into_iter()
        .map(|keypair| {
            Minion::new(
                keypair,
                Arc::clone(&bot),
                Arc::clone(&ledger),
                config.minion_settings(),
            )
        })
        .collect();
    let pool = MinionPool::start(minions, config.minions.queue_capacity)?;

    let mut pending = Vec::with_capacity(destinations.len());
    for destination in &destinations {
        pending.push((destination, pool.submit(destination).await?));
    }

    let mut all_ok = true;
    for (destination, receiver) in pending {
        match receiver.await {
            Ok(SubmitResult::Success(success)) => {
                println!(
                    "✅ {} funded in ledger {} ({})",
                    destination, success.ledger, success.hash
                );
            }
            Ok(result) if result.is_account_exists() => {
                println!("ℹ️  {} already exists", destination);
            }
            Ok(SubmitResult::Failure(failure)) => {
                all_ok = false;
                eprintln!("❌ {}: {} [{:?}]", destination, failure, failure.category());
            }
            Err(_) => {
                all_ok = false;
                eprintln!("❌ {}: worker dropped the request", destination);
            }
        }
    }

    pool.shutdown().await;
    Ok(all_ok)
}

fn keygen(count: usize) {
    for _ in 0..count {
        let keypair = KeyPair::generate();
        println!("account: {}", keypair.account_id());
        println!("secret:  {}", keypair.secret_hex());
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Keygen { count } => {
            keygen(count);
            Ok(ExitCode::SUCCESS)
        }
        Command::Fund {
            destinations,
            in_memory,
        } => {
            let config = load_config(&cli.config)?;
            if fund(config, destinations, in_memory).await? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
