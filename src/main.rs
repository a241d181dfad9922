use clap::{Parser, Subcommand};
use data_encoding::HEXLOWER;
use minicoin::node::NodeContext;
use minicoin::{
    Blockchain, CENTRAL_NODE, CoinError, Config, ProofOfWork, Result, Server, Transaction,
    UTXOSet, Wallets, convert_address, hash_pub_key, validate_address,
};
use tracing::info;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};

#[derive(Debug, Parser)]
#[command(name = "minicoin")]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(
        name = "createblockchain",
        about = "Create a blockchain and send the genesis reward to ADDRESS"
    )]
    Createblockchain {
        #[arg(long, help = "The address to send the genesis block reward to")]
        address: String,
    },
    #[command(name = "printchain", about = "Print the blocks in the chain")]
    Printchain,
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(name = "listaddresses", about = "List the addresses in the wallet file")]
    Listaddresses,
    #[command(name = "getbalance", about = "Get the balance for an address")]
    Getbalance {
        #[arg(long, help = "The address to get the balance for")]
        address: String,
    },
    #[command(name = "reindexutxo", about = "Rebuild the UTXO index")]
    Reindexutxo,
    #[command(
        name = "send",
        about = "Send AMOUNT of coins. With --mine, mine immediately on this node"
    )]
    Send {
        #[arg(long, help = "Source wallet address")]
        from: String,
        #[arg(long, help = "Destination wallet address")]
        to: String,
        #[arg(long, help = "Amount to send")]
        amount: i64,
        #[arg(long, help = "Mine immediately on the same node")]
        mine: bool,
    },
    #[command(
        name = "startnode",
        about = "Start a node with the ID taken from the NODE_ID env. var."
    )]
    StartNode {
        #[arg(long, help = "Enable mining and send rewards to ADDRESS")]
        miner: Option<String>,
    },
}

/// Initialize logging with an env-driven filter, INFO by default.
fn initialize_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();
}

fn ensure_valid_address(address: &str) -> Result<()> {
    if !validate_address(address)? {
        return Err(CoinError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

async fn create_blockchain(config: &Config, address: &str) -> Result<()> {
    ensure_valid_address(address)?;
    let blockchain = Blockchain::create(&config.db_path(), address).await?;
    let utxo_set = UTXOSet::new(blockchain);
    utxo_set.reindex().await?;
    info!("Created a new blockchain, genesis reward sent to {}", address);
    Ok(())
}

fn format_transaction_input(input: &minicoin::TXInput) -> String {
    let address = convert_address(hash_pub_key(input.get_pub_key()).as_slice())
        .unwrap_or_else(|_| "Unknown".to_string());
    format!(
        "-- Input txid = {}, vout = {}, from = {}",
        input.get_txid_hex(),
        input.get_vout(),
        address
    )
}

fn format_transaction_output(output: &minicoin::TXOutput) -> String {
    let address = convert_address(output.get_pub_key_hash())
        .unwrap_or_else(|_| "Unknown".to_string());
    format!("-- Output value = {}, to = {}", output.get_value(), address)
}

fn process_transaction(tx: &Transaction) {
    info!("- Transaction txid: {}", tx.get_tx_id_hex());

    if tx.not_coinbase() {
        tx.get_vin()
            .iter()
            .map(format_transaction_input)
            .for_each(|line| info!("{}", line));
    }
    tx.get_vout()
        .iter()
        .map(format_transaction_output)
        .for_each(|line| info!("{}", line));
}

async fn print_chain(config: &Config) -> Result<()> {
    let blockchain = Blockchain::open(&config.db_path()).await?;
    let mut iterator = blockchain.iterator().await;
    while let Some(block) = iterator.next() {
        let pow_valid = ProofOfWork::new_proof_of_work(block.clone()).validate()?;
        info!("Pre block hash: {}", HEXLOWER.encode(block.get_prev_block_hash()));
        info!("Cur block hash: {}", HEXLOWER.encode(block.get_hash()));
        info!("Height: {}, PoW valid: {}", block.get_height(), pow_valid);
        block.get_transactions().iter().for_each(process_transaction);
    }
    Ok(())
}

fn create_wallet(config: &Config) -> Result<()> {
    let mut wallets = Wallets::new(&config.wallet_file())?;
    let address = wallets.create_wallet()?;
    info!("Your new address: {}", address);
    Ok(())
}

fn list_addresses(config: &Config) -> Result<()> {
    let wallets = Wallets::new(&config.wallet_file())?;
    for address in wallets.get_addresses() {
        info!("{}", address);
    }
    Ok(())
}

async fn get_balance(config: &Config, address: &str) -> Result<()> {
    ensure_valid_address(address)?;
    let blockchain = Blockchain::open(&config.db_path()).await?;
    let utxo_set = UTXOSet::new(blockchain);
    let balance = utxo_set.get_balance(address).await?;
    info!("Balance of {}: {}", address, balance);
    Ok(())
}

async fn reindex_utxo(config: &Config) -> Result<()> {
    let blockchain = Blockchain::open(&config.db_path()).await?;
    let utxo_set = UTXOSet::new(blockchain);
    utxo_set.reindex().await?;
    let count = utxo_set.count_transactions().await?;
    info!("Done! There are {} transactions in the UTXO set", count);
    Ok(())
}

async fn send(config: &Config, from: &str, to: &str, amount: i64, mine_now: bool) -> Result<()> {
    ensure_valid_address(from)?;
    ensure_valid_address(to)?;

    let blockchain = Blockchain::open(&config.db_path()).await?;
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().await?;

    let wallets = Wallets::new(&config.wallet_file())?;
    let wallet = wallets
        .get_wallet(from)
        .ok_or(CoinError::WalletNotFound(from.to_string()))?;

    let tx = Transaction::new_utxo_transaction(wallet, to, amount, &utxo_set).await?;

    if mine_now {
        let coinbase_tx = Transaction::new_coinbase_tx(from, "")?;
        let block = blockchain.mine_block(&[coinbase_tx, tx]).await?;
        utxo_set.update(&block).await?;
    } else {
        let ctx = NodeContext::new(blockchain, config.node_addr(), CENTRAL_NODE.clone(), None);
        let central_node = ctx.known_nodes().central_node()?;
        minicoin::network::operations::send_tx(&ctx, &central_node, &tx).await;
    }
    info!("Success!");
    Ok(())
}

async fn start_node(config: &Config, miner: Option<String>) -> Result<()> {
    info!("Starting node {}", config.node_id());
    if let Some(miner_address) = miner.as_deref() {
        ensure_valid_address(miner_address)?;
        info!("Mining is on. Address to receive rewards: {}", miner_address);
    }

    let blockchain = Blockchain::open(&config.db_path()).await?;
    let ctx = NodeContext::new(blockchain, config.node_addr(), CENTRAL_NODE.clone(), miner);
    Server::new(ctx).run().await
}

async fn process_command(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Createblockchain { address } => create_blockchain(config, &address).await,
        Command::Printchain => print_chain(config).await,
        Command::Createwallet => create_wallet(config),
        Command::Listaddresses => list_addresses(config),
        Command::Getbalance { address } => get_balance(config, &address).await,
        Command::Reindexutxo => reindex_utxo(config).await,
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => send(config, &from, &to, amount, mine).await,
        Command::StartNode { miner } => start_node(config, miner).await,
    }
}

#[tokio::main]
async fn main() {
    initialize_logging();

    let opt = Opt::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Not an error to diagnose, just a prerequisite to point out.
            eprintln!("{}", e);
            return;
        }
    };

    if let Err(e) = process_command(&config, opt.command).await {
        match e {
            CoinError::BlockchainNotFound(_) | CoinError::BlockchainAlreadyExists(_) => {
                eprintln!("{}", e);
            }
            _ => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
