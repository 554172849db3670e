use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use colored::Colorize;
use lip_backend::{ArchiveSource, LedgerSource, MemoryArchive};
use lip_crypto::LedgerChainVerifier;
use lip_extract::{ChangeReader, ChangeStats, PaymentWorkload, TransactionReader};
use lip_loadtest::{ReplayConfig, ReplayFixtures, ReplaySource};
use lip_merge::LedgerMerger;
use lip_stream::{RecordKind, StreamConfig, StreamReader};
use lip_types::{Hash, LedgerCloseMeta, NetworkId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::*;

/// First sequence of generated fixture ledgers, far from any network ledger
/// so fixture and network transactions never share a hash.
const FIXTURE_FIRST_LEDGER: u32 = 1 << 24;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let network = cli.network_id();
    let format = cli.format.clone();
    match cli.command {
        Command::Merge(args) => cmd_merge(args, &network),
        Command::Inspect(args) => cmd_inspect(args, &network, format),
        Command::Verify(args) => cmd_verify(args, &network),
        Command::Replay(args) => cmd_replay(args, format).await,
        Command::Generate(args) => cmd_generate(args, &network),
    }
}

fn cmd_merge(args: MergeArgs, network: &NetworkId) -> anyhow::Result<()> {
    let config = StreamConfig::default();
    let ledgers = lip_stream::read_ledgers(&args.input, &config)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let merger = LedgerMerger::new(args.batch_size)?;
    let merged = if args.verify {
        merger.merge_verified(&ledgers, network)?
    } else {
        merger.merge(&ledgers)?
    };
    lip_stream::write_ledgers(&args.output, &merged, &config)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "{} Merged {} ledgers into {} of {} transactions",
        "✓".green().bold(),
        ledgers.len(),
        merged.len().to_string().bold(),
        args.batch_size
    );
    if args.verify {
        println!("  Equivalence: {}", "verified".green());
    }
    println!("  Output: {}", args.output.display());
    Ok(())
}

/// Per-ledger counts printed by `inspect` and `replay`.
#[derive(Debug, Serialize)]
struct LedgerSummary {
    sequence: u32,
    hash: Hash,
    protocol_version: u32,
    transactions: usize,
    successful: usize,
    changes: ChangeStats,
}

fn summarize(ledger: &LedgerCloseMeta, network: &NetworkId) -> anyhow::Result<LedgerSummary> {
    let seq = ledger.sequence();
    let mut successful = 0;
    let mut transactions = 0;
    for tx in TransactionReader::new(ledger, network)? {
        let tx = tx.with_context(|| format!("decoding transactions of ledger {seq}"))?;
        transactions += 1;
        if tx.successful() {
            successful += 1;
        }
    }
    let mut changes = ChangeStats::new();
    for change in ChangeReader::new(ledger, network)? {
        let change = change.with_context(|| format!("decoding changes of ledger {seq}"))?;
        changes.record(&change);
    }
    changes.record_evictions(ledger.evicted_keys.len());
    Ok(LedgerSummary {
        sequence: seq,
        hash: ledger.hash(),
        protocol_version: ledger.protocol_version(),
        transactions,
        successful,
        changes,
    })
}

fn print_summary(summary: &LedgerSummary, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(summary)?),
        OutputFormat::Text => {
            let failed = summary.transactions - summary.successful;
            let failed = if failed > 0 {
                format!(", {} failed", failed).red().to_string()
            } else {
                String::new()
            };
            println!(
                "{} {}  {} txs{}  {}",
                format!("#{}", summary.sequence).yellow().bold(),
                summary.hash.short_hex().dimmed(),
                summary.transactions,
                failed,
                summary.changes
            );
        }
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, network: &NetworkId, format: OutputFormat) -> anyhow::Result<()> {
    let mut reader = StreamReader::open(&args.input, RecordKind::Ledger, &StreamConfig::default())
        .with_context(|| format!("opening {}", args.input.display()))?;
    let limit = args.limit.unwrap_or(usize::MAX);
    let mut totals = ChangeStats::new();
    let mut ledgers = 0;
    for ledger in reader.records::<LedgerCloseMeta>().take(limit) {
        let ledger = ledger?;
        let summary = summarize(&ledger, network)?;
        totals.merge(&summary.changes);
        print_summary(&summary, &format)?;
        ledgers += 1;
    }
    if format == OutputFormat::Text {
        println!("{} ledgers, {}", ledgers.to_string().bold(), totals);
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, network: &NetworkId) -> anyhow::Result<()> {
    let mut reader = StreamReader::open(&args.input, RecordKind::Ledger, &StreamConfig::default())
        .with_context(|| format!("opening {}", args.input.display()))?;
    let mut chain = LedgerChainVerifier::new();
    if args.headers {
        chain = chain.with_header_verification();
    }
    let mut ledgers = 0u64;
    let mut transactions = 0usize;
    for ledger in reader.records::<LedgerCloseMeta>() {
        let ledger = ledger?;
        chain
            .observe(&ledger)
            .with_context(|| format!("chain broken at ledger {}", ledger.sequence()))?;
        transactions += summarize(&ledger, network)?.transactions;
        ledgers += 1;
    }
    if ledgers == 0 {
        bail!("{} holds no ledgers", args.input.display());
    }
    println!("{} {} ledgers verified", "✓".green().bold(), ledgers);
    println!("  Hash chain: {}", "linked".green());
    if args.headers {
        println!("  Headers: {}", "match".green());
    }
    println!("  Transactions: {} decoded", transactions);
    Ok(())
}

async fn cmd_replay(args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = ReplayConfig::load(&args.config)?;
    if let Some(ms) = args.close_ms {
        config.ledger_close_duration_ms = ms;
    }
    let network = config.network();
    let base = args.config.parent().unwrap_or(Path::new("."));
    let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };

    let archive = MemoryArchive::load(&resolve(&config.source_path), &config.stream)
        .context("loading source ledgers")?;
    let fixtures = ReplayFixtures::load(
        &resolve(&config.ledgers_path),
        &resolve(&config.entries_path),
        &config.stream,
    )
    .context("loading fixtures")?;
    let source = ReplaySource::new(
        ArchiveSource::new(archive),
        fixtures,
        config.ledger_close_duration(),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = replay_all(&source, &config, &network, &cancel, &format).await;
    source.close().await?;
    result
}

async fn replay_all<S: LedgerSource>(
    source: &S,
    config: &ReplayConfig,
    network: &NetworkId,
    cancel: &CancellationToken,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let range = config.range();
    source
        .prepare_range(range, cancel)
        .await
        .with_context(|| format!("preparing {range}"))?;
    let latest = source.latest_ledger_sequence().await?;
    info!(%range, latest, "replay started");

    let started = Instant::now();
    let mut totals = ChangeStats::new();
    let mut transactions = 0;
    for seq in range.from..=latest {
        let ledger = source
            .get_ledger(seq, cancel)
            .await
            .with_context(|| format!("replaying ledger {seq}"))?;
        let summary = summarize(&ledger, network)?;
        transactions += summary.transactions;
        totals.merge(&summary.changes);
        print_summary(&summary, format)?;
    }

    if *format == OutputFormat::Text {
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        println!(
            "{} Replayed {} ledgers, {} transactions ({:.1} tx/s)",
            "✓".green().bold(),
            latest - range.from + 1,
            transactions,
            transactions as f64 / elapsed
        );
        println!("  {}", totals);
    }
    Ok(())
}

/// Paths written by `generate`.
#[derive(Debug)]
struct GeneratedFiles {
    source: PathBuf,
    fixtures: PathBuf,
    entries: PathBuf,
    config: PathBuf,
}

fn generate_files(args: &GenerateArgs, network: &NetworkId) -> anyhow::Result<GeneratedFiles> {
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let stream = StreamConfig::default();

    let network_ledgers = PaymentWorkload::new(network.clone(), args.start, 2)
        .ledgers(args.ledgers, 1)?;
    let mut fixture_workload =
        PaymentWorkload::new(network.clone(), FIXTURE_FIRST_LEDGER, args.accounts);
    let entries = fixture_workload.entries();
    let fixtures = ReplayFixtures::new(
        fixture_workload.ledgers(args.fixtures, args.txs_per_ledger)?,
        entries,
    );

    let config = ReplayConfig {
        network_passphrase: network.passphrase().to_string(),
        start_ledger: args.start,
        end_ledger: None,
        stream: stream.clone(),
        ..ReplayConfig::default()
    };
    let files = GeneratedFiles {
        source: args.out_dir.join(&config.source_path),
        fixtures: args.out_dir.join(&config.ledgers_path),
        entries: args.out_dir.join(&config.entries_path),
        config: args.out_dir.join("replay.toml"),
    };

    lip_stream::write_ledgers(&files.source, &network_ledgers, &stream)?;
    fixtures.save(&files.fixtures, &files.entries, &stream)?;
    std::fs::write(&files.config, config.to_toml()?)
        .with_context(|| format!("writing {}", files.config.display()))?;
    Ok(files)
}

fn cmd_generate(args: GenerateArgs, network: &NetworkId) -> anyhow::Result<()> {
    if args.ledgers <= args.fixtures {
        bail!(
            "need more network ledgers ({}) than fixture ledgers ({})",
            args.ledgers,
            args.fixtures
        );
    }
    let files = generate_files(&args, network)?;
    println!("{} Generated load-test data", "✓".green().bold());
    println!("  Network ledgers: {} ({})", args.ledgers, files.source.display());
    println!(
        "  Fixtures: {} ledgers x {} payments ({})",
        args.fixtures,
        args.txs_per_ledger,
        files.fixtures.display()
    );
    println!("  Entries: {}", files.entries.display());
    println!("  Replay config: {}", files.config.display().to_string().cyan());
    Ok(())
}
