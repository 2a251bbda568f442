use anyhow::{Context, Result, anyhow};
use bet_rpc::aggregate;
use bet_rpc::bet::{BetPhase, BetRecord, CreateBetInput, HexIdentity, IdentityFormat};
use bet_rpc::capture::{CAPTURE_VERSION, CaptureHeader, CaptureSink, now_unix_ns};
use bet_rpc::client::BetProvider;
use bet_rpc::codec::{self, PackedDate};
use bet_rpc::config::{ClientConfig, DEFAULT_CONTRACT_INDEX};
use bet_rpc::node_info::{NodeInfo, decode_active_bet_ids};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Query, decode and reconcile bets on the ledger betting contract")]
struct Args {
    /// Node RPC base URL
    #[arg(long, env = "NODE_URL", default_value = "http://127.0.0.1:8000")]
    node_url: String,

    /// Archive service base URL; enables the historical source
    #[arg(long, env = "ARCHIVE_URL")]
    archive_url: Option<String>,

    /// Contract index of the betting contract
    #[arg(long, env = "CONTRACT_INDEX", default_value_t = DEFAULT_CONTRACT_INDEX)]
    contract_index: u32,

    /// Tries per network call, including the first
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Pause between tries in milliseconds
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 0)]
    retry_delay_ms: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Record every query response to this capture file (.bin)
    #[arg(long, env = "CAPTURE_FILE")]
    capture: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Contract statistics
    NodeInfo,
    /// Ids of bets the node still tracks
    Active,
    /// One bet by id
    Bet {
        id: u32,
        /// Skip the session cache
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// Live and archival bets merged, optionally filtered by phase
    List {
        #[arg(long, value_enum)]
        phase: Option<PhaseArg>,
    },
    /// Decode a base64 response offline
    Decode {
        #[arg(long, value_enum, default_value_t = Kind::Bet)]
        kind: Kind,
        base64: String,
    },
    /// Print the base64 create-bet payload for a JSON description, for an external signer
    EncodeCreate { input: PathBuf },
    /// Poll the merged bet list until Ctrl+C
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PhaseArg {
    Active,
    Locked,
    Inactive,
}

impl From<PhaseArg> for BetPhase {
    fn from(p: PhaseArg) -> Self {
        match p {
            PhaseArg::Active => BetPhase::Active,
            PhaseArg::Locked => BetPhase::Locked,
            PhaseArg::Inactive => BetPhase::Inactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Bet,
    NodeInfo,
    ActiveIds,
}

/// `encode-create` input file.
#[derive(Debug, Deserialize)]
struct CreateBetFile {
    description: String,
    options: Vec<String>,
    /// Hex identities
    oracle_provider_ids: Vec<String>,
    /// Hundredths of a percent
    oracle_fees: Vec<u32>,
    close_date: String,
    close_time: String,
    end_date: String,
    end_time: String,
    amount_per_slot: u64,
    max_slots_per_option: u32,
}

impl CreateBetFile {
    fn into_input(self) -> Result<CreateBetInput> {
        let oracle_provider_ids = self
            .oracle_provider_ids
            .iter()
            .map(|s| HexIdentity.parse(s).with_context(|| format!("oracle id {s:?} is not 64 hex chars")))
            .collect::<Result<Vec<_>>>()?;
        Ok(CreateBetInput {
            description: self.description,
            options: self.options,
            oracle_provider_ids,
            oracle_fees: self.oracle_fees,
            close_date: PackedDate::parse(&self.close_date, &self.close_time).context("close date")?,
            end_date: PackedDate::parse(&self.end_date, &self.end_time).context("end date")?,
            amount_per_slot: self.amount_per_slot,
            max_slots_per_option: self.max_slots_per_option,
        })
    }
}

fn print_json<T: Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

fn decode_offline(kind: Kind, b64: &str) -> Result<()> {
    let buf = codec::decode_base64(b64)?;
    match kind {
        Kind::Bet => print_json(&BetRecord::decode(&buf)?.normalize(&HexIdentity)),
        Kind::NodeInfo => print_json(&NodeInfo::decode(&buf)?.normalize(&HexIdentity)),
        Kind::ActiveIds => print_json(&decode_active_bet_ids(&buf)?),
    }
}

fn encode_create(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    let file: CreateBetFile = serde_json::from_str(&text).context("parse create-bet JSON")?;
    let payload = file.into_input()?.encode()?;
    println!("{}", codec::encode_base64(&payload));
    Ok(())
}

fn poll_summary(bets: &[BetRecord], now: PackedDate, cached: usize) -> String {
    format!(
        "{} {} {} bets: {} active, {} locked, {} inactive (cached {})",
        now.date_string(),
        now.time_string(),
        bets.len(),
        aggregate::active(bets, now).len(),
        aggregate::locked(bets, now).len(),
        aggregate::inactive(bets, now).len(),
        cached
    )
}

async fn watch(provider: &BetProvider, interval: Duration) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).context("install Ctrl+C handler")?;

    while !stop.load(Ordering::SeqCst) {
        match provider.all_bets(true).await {
            Ok(bets) => println!("{}", poll_summary(&bets, PackedDate::now_utc()?, provider.cache().len())),
            Err(e) => eprintln!("poll failed: {e:#}"),
        }
        let mut waited = Duration::ZERO;
        while waited < interval && !stop.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(250)).await;
            waited += Duration::from_millis(250);
        }
    }
    Ok(())
}

async fn run(cmd: Command, provider: &BetProvider) -> Result<()> {
    match cmd {
        Command::NodeInfo => print_json(&provider.node_info().await?),
        Command::Active => print_json(&provider.active_bet_ids().await?),
        Command::Bet { id, refresh } => print_json(&provider.bet(id, refresh).await?),
        Command::List { phase } => {
            let bets = provider.all_bets(false).await?;
            match phase {
                Some(p) => print_json(&aggregate::by_phase(&bets, p.into(), PackedDate::now_utc()?)),
                None => print_json(&bets),
            }
        }
        Command::Watch { interval } => {
            if interval == 0 {
                return Err(anyhow!("--interval must be at least 1 second"));
            }
            watch(provider, Duration::from_secs(interval)).await
        }
        Command::Decode { kind, base64 } => decode_offline(kind, &base64),
        Command::EncodeCreate { input } => encode_create(&input),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    // Offline commands need no node.
    match &args.cmd {
        Command::Decode { kind, base64 } => return decode_offline(*kind, base64),
        Command::EncodeCreate { input } => return encode_create(input),
        _ => {}
    }

    let config = ClientConfig {
        node_url: args.node_url.clone(),
        archive_url: args.archive_url.clone(),
        contract_index: args.contract_index,
        max_attempts: args.max_attempts,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        request_timeout: Duration::from_secs(args.timeout_secs),
        ..ClientConfig::default()
    };
    let mut provider = BetProvider::from_config(config).context("build client")?;
    if let Some(path) = &args.capture {
        let header = CaptureHeader {
            version: CAPTURE_VERSION,
            created_unix_ns: now_unix_ns(),
            node_url: args.node_url.clone(),
            contract_index: args.contract_index,
        };
        let sink = CaptureSink::create(path, header).with_context(|| format!("open capture {:?}", path))?;
        provider = provider.with_capture(sink);
    }

    let outcome = run(args.cmd, &provider).await;

    if let Some(n) = provider.finish_capture().context("flush capture")? {
        eprintln!("captured {} responses", n);
    }
    outcome
}
