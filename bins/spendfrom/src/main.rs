//! spendfrom: spend coins from chosen addresses of a wallet node.
//!
//! Lists balances when no destination is given; otherwise builds a
//! transaction from the source addresses only, has the node sign it, and
//! optionally broadcasts it. Hex and txids go to stdout, logs to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use spendfrom_core::{Destination, FeePolicy, Policy, RequestError, SpendRequest};
use spendfrom_rpc::config::default_data_dir;
use spendfrom_rpc::{ConfigError, ConnectionOverrides, NodeConf, NodeFlavor, RpcClient, SignMethod};
use spendfrom_wallet::{CoinControl, CoinControlError, SubmitMode};
use tracing::{error, info};

/// Spend from specific addresses of a wallet node ("coin control").
#[derive(Parser, Debug)]
#[command(name = "spendfrom")]
#[command(version, about = "Spend coins from chosen addresses only.")]
struct Cli {
    /// Source addresses whose coins may be spent (comma separated).
    #[arg(long, value_delimiter = ',')]
    from: Vec<String>,

    /// Payments as <address>:<amount> in coins (comma separated).
    #[arg(long, value_delimiter = ',', requires = "from")]
    to: Vec<String>,

    /// Fee in coins, or "auto" to size it from the transaction.
    #[arg(long, default_value = "auto")]
    fee: String,

    /// Only spend outputs with at least this many confirmations.
    #[arg(long, default_value_t = 1)]
    minconf: u32,

    /// Sign but do not broadcast (the default).
    #[arg(long, conflicts_with_all = ["broadcast", "unsigned"])]
    dry_run: bool,

    /// Sign and broadcast.
    #[arg(long, conflicts_with = "unsigned")]
    broadcast: bool,

    /// Print the unsigned transaction for offline signing.
    #[arg(long)]
    unsigned: bool,

    /// Change address (default: the last source address).
    #[arg(long)]
    change: Option<String>,

    /// Node software: truthcoin or bitcoin. Picks the default data
    /// directory and configuration file name.
    #[arg(long, default_value = "truthcoin")]
    node: NodeFlavor,

    /// Node data directory.
    #[arg(long)]
    datadir: Option<PathBuf>,

    /// Node configuration file (default: <datadir>/truthcoin.conf).
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Use the test network.
    #[arg(long)]
    testnet: bool,

    /// RPC endpoint, overriding rpcconnect/rpcport.
    #[arg(long)]
    rpc_url: Option<String>,

    /// RPC user, overriding the configuration file.
    #[arg(long)]
    rpc_user: Option<String>,

    /// RPC password, overriding the configuration file.
    #[arg(long)]
    rpc_password: Option<String>,

    /// Sign with `signrawtransactionwithwallet` instead of `signrawtransaction`.
    #[arg(long)]
    sign_with_wallet: bool,

    /// RPC timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn submit_mode(&self) -> SubmitMode {
        if self.unsigned {
            SubmitMode::Unsigned
        } else if self.broadcast {
            SubmitMode::Broadcast
        } else {
            SubmitMode::Sign
        }
    }

    fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            url: self.rpc_url.clone(),
            user: self.rpc_user.clone(),
            password: self.rpc_password.clone(),
            testnet: self.testnet,
            timeout: self.timeout.map(Duration::from_secs),
            sign_method: self.sign_with_wallet.then_some(SignMethod::WithWallet),
        }
    }

    fn spend_request(&self) -> Result<SpendRequest, CoinControlError> {
        let destinations = self
            .to
            .iter()
            .map(|d| d.parse::<Destination>())
            .collect::<Result<Vec<_>, _>>()?;
        let fee: FeePolicy = self.fee.parse().map_err(RequestError::from)?;
        Ok(SpendRequest::new(
            self.from.clone(),
            destinations,
            fee,
            self.minconf,
            self.change.clone(),
        )?)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.log_json);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            if let Some(hex) = e
                .downcast_ref::<CoinControlError>()
                .and_then(CoinControlError::signed_hex)
            {
                println!("{hex}");
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli) -> Result<()> {
    // Parse the request first so typos fail before any node access.
    let request = if cli.to.is_empty() {
        None
    } else {
        Some(cli.spend_request()?)
    };

    let data_dir = match &cli.datadir {
        Some(d) => d.clone(),
        None => default_data_dir(cli.node)?,
    };
    let conf_path = cli
        .conf
        .clone()
        .unwrap_or_else(|| data_dir.join(cli.node.conf_file()));
    let node_conf = NodeConf::load_with_env(&conf_path)?;
    let rpc_config = node_conf.resolve(&data_dir, &conf_path, &cli.overrides())?;
    info!(url = %rpc_config.url, "connecting to node");
    let client = RpcClient::new(rpc_config)?;

    let policy = Policy {
        min_confirmations: cli.minconf,
        ..Policy::default()
    };
    let coin_control = CoinControl::new(&client, policy);

    let Some(request) = request else {
        return list_balances(&coin_control, &cli.from).await;
    };

    let mode = cli.submit_mode();
    let plan = coin_control.prepare(&request).await?;
    if mode != SubmitMode::Unsigned {
        coin_control
            .unlock(now_secs(), || {
                rpassword::prompt_password("Wallet passphrase: ")
                    .ok()
                    .filter(|p| !p.is_empty())
            })
            .await?;
    }
    let submission = coin_control.submit(&plan, mode).await?;
    if mode == SubmitMode::Sign {
        info!("dry run: signed transaction not broadcast");
    }
    println!("{}", submission.output());
    Ok(())
}

async fn list_balances(coin_control: &CoinControl<'_>, addresses: &[String]) -> Result<()> {
    let balances = coin_control
        .balances(addresses)
        .await
        .context("listing balances")?;
    if balances.is_empty() {
        info!("no spendable outputs");
    }
    for b in balances {
        println!("{:<40} {:>20} ({} outputs)", b.address, b.total.to_string(), b.outputs);
    }
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Exit code for an error chain: the coin-control kind when there is one.
fn exit_code(e: &anyhow::Error) -> u8 {
    if let Some(cc) = e.downcast_ref::<CoinControlError>() {
        return u8::try_from(cc.exit_code()).unwrap_or(1);
    }
    match e.downcast_ref::<ConfigError>() {
        Some(ConfigError::NoCredentials { .. } | ConfigError::Cookie { .. }) => 3,
        _ => 1,
    }
}
