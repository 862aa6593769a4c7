//! StakeChain node entry point.
//!
//! There's no real network transport here (see DESIGN.md): this binary
//! wires up a single in-process [`MessageBus`] and spawns one task per
//! simulated participant, a mix of plain [`Client`]s and mint-eligible
//! [`Miner`]s, each with its own wallet credited out of a genesis block.

use std::path::PathBuf;

use clap::Parser;
use config::Config;
use serde::Deserialize;

use stakechain_consensus::ConsensusParams;
use stakechain_core::Block;
use stakechain_node::{Client, Miner, MessageBus, ParticipantId};
use stakechain_wallet::Wallet;

/// Command line arguments for the StakeChain node.
#[derive(Parser)]
#[clap(name = "stakechain")]
#[clap(about = "A minimal proof-of-stake-style cryptocurrency node simulation")]
struct Cli {
    /// Sets a custom config file, layered over the built-in defaults.
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of miner participants to spawn.
    #[clap(long, default_value = "3")]
    miners: usize,

    /// Number of non-mining client participants to spawn.
    #[clap(long, default_value = "2")]
    clients: usize,

    /// Starting balance credited to each participant in the genesis block.
    #[clap(long, default_value = "100")]
    genesis_balance: u64,

    /// How long to run the simulation before shutting down.
    #[clap(long, default_value = "10")]
    run_seconds: u64,

    /// Log verbosity (error, warn, info, debug, trace).
    #[clap(short, long, default_value = "info")]
    verbosity: String,
}

/// Settings loadable from a config file, layered under CLI overrides.
#[derive(Debug, Deserialize, Default)]
struct NodeSettings {
    consensus: Option<ConsensusParams>,
}

fn init_logging(verbosity: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(verbosity)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(config_path: Option<&PathBuf>) -> NodeSettings {
    let mut builder = Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    match builder.build() {
        Ok(config) => config.try_deserialize().unwrap_or_default(),
        Err(_) => NodeSettings::default(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);

    tracing::info!("starting StakeChain node simulation");

    let settings = load_settings(cli.config.as_ref());
    let params = settings.consensus.unwrap_or_default();

    let bus = MessageBus::default();

    let total_participants = cli.miners + cli.clients;
    let mut wallets: Vec<Wallet> = (0..total_participants).map(|_| Wallet::new()).collect();
    let mut initial_balances = Vec::with_capacity(total_participants);
    for wallet in &mut wallets {
        let address = wallet.make_address();
        initial_balances.push((address, cli.genesis_balance));
    }

    let (genesis, credits) = Block::make_genesis_block(&initial_balances, stakechain_util::now_millis());
    for (address, txid, output_index, output) in credits {
        for wallet in &mut wallets {
            if wallet.has_key(&address) {
                wallet
                    .add_utxo(output.clone(), txid, output_index)
                    .expect("has_key just confirmed this address is known");
                break;
            }
        }
    }

    let mut handles = Vec::with_capacity(total_participants);
    let mut wallets = wallets.into_iter();

    for i in 0..cli.miners {
        let id = ParticipantId(i as u64);
        let wallet = wallets.next().expect("one wallet reserved per participant");
        let miner = Miner::new(id, wallet, bus.clone(), genesis.clone(), params);
        tracing::info!(miner = %id, "spawning miner");
        handles.push(tokio::spawn(miner.run()));
    }

    for i in 0..cli.clients {
        let id = ParticipantId((cli.miners + i) as u64);
        let wallet = wallets.next().expect("one wallet reserved per participant");
        let client = Client::new(id, wallet, bus.clone());
        tracing::info!(client = %id, "spawning client");
        handles.push(tokio::spawn(client.run()));
    }

    tokio::time::sleep(tokio::time::Duration::from_secs(cli.run_seconds)).await;

    tracing::info!("shutting down StakeChain node simulation");
    for handle in handles {
        handle.abort();
    }
}
