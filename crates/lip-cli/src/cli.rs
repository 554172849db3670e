use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use lip_types::NetworkId;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "lip",
    about = "Ledger Ingestion Pipeline: ledger merging, inspection, and paced replay",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Network passphrase transaction hashes commit to
    #[arg(long, global = true, default_value = NetworkId::TESTNET_PASSPHRASE)]
    pub network: String,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    }

    pub fn network_id(&self) -> NetworkId {
        NetworkId::from_passphrase(self.network.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge a ledger file into ledgers of a fixed transaction count
    Merge(MergeArgs),
    /// Show transaction and change counts per ledger
    Inspect(InspectArgs),
    /// Check hash-chain linkage and decodability of a ledger file
    Verify(VerifyArgs),
    /// Replay ledgers with fixtures spliced in, at a fixed close rate
    Replay(ReplayArgs),
    /// Write synthetic network ledgers, fixtures, and a replay config
    Generate(GenerateArgs),
}

#[derive(Args)]
pub struct MergeArgs {
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(short, long)]
    pub output: PathBuf,
    /// Transactions per merged ledger
    #[arg(short, long)]
    pub batch_size: usize,
    /// Check that merged ledgers decode to the same changes as the input
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    #[arg(short, long)]
    pub input: PathBuf,
    /// Stop after this many ledgers
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[arg(short, long)]
    pub input: PathBuf,
    /// Also recompute every header hash
    #[arg(long)]
    pub headers: bool,
}

#[derive(Args)]
pub struct ReplayArgs {
    #[arg(short, long)]
    pub config: PathBuf,
    /// Override the configured ledger close duration
    #[arg(long)]
    pub close_ms: Option<u64>,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Directory receiving the generated files
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
    /// Sequence of the first network ledger
    #[arg(long, default_value = "2")]
    pub start: u32,
    /// Network ledgers to generate
    #[arg(long, default_value = "20")]
    pub ledgers: usize,
    /// Fixture ledgers to generate
    #[arg(long, default_value = "10")]
    pub fixtures: usize,
    /// Payments per fixture ledger
    #[arg(long, default_value = "50")]
    pub txs_per_ledger: usize,
    /// Accounts the fixture payments rotate through
    #[arg(long, default_value = "16")]
    pub accounts: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_merge() {
        let cli = Cli::try_parse_from([
            "lip", "merge", "-i", "in.lips", "-o", "out.lips", "-b", "100", "--verify",
        ])
        .unwrap();
        if let Command::Merge(args) = cli.command {
            assert_eq!(args.input, PathBuf::from("in.lips"));
            assert_eq!(args.batch_size, 100);
            assert!(args.verify);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn merge_requires_batch_size() {
        assert!(Cli::try_parse_from(["lip", "merge", "-i", "a", "-o", "b"]).is_err());
    }

    #[test]
    fn parse_inspect_json() {
        let cli =
            Cli::try_parse_from(["lip", "inspect", "-i", "x.lips", "--format", "json", "-n", "3"])
                .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        if let Command::Inspect(args) = cli.command {
            assert_eq!(args.limit, Some(3));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn verbosity_sets_level() {
        let quiet = Cli::try_parse_from(["lip", "verify", "-i", "x"]).unwrap();
        assert_eq!(quiet.log_level(), Level::WARN);
        let loud = Cli::try_parse_from(["lip", "-vv", "verify", "-i", "x"]).unwrap();
        assert_eq!(loud.log_level(), Level::DEBUG);
    }

    #[test]
    fn network_defaults_to_testnet() {
        let cli = Cli::try_parse_from(["lip", "replay", "-c", "r.toml"]).unwrap();
        assert_eq!(cli.network_id(), NetworkId::testnet());
        let cli =
            Cli::try_parse_from(["lip", "--network", "other", "replay", "-c", "r.toml"]).unwrap();
        assert_eq!(cli.network_id(), NetworkId::from_passphrase("other"));
    }

    #[test]
    fn parse_generate_defaults() {
        let cli = Cli::try_parse_from(["lip", "generate"]).unwrap();
        if let Command::Generate(args) = cli.command {
            assert_eq!(args.start, 2);
            assert_eq!(args.fixtures, 10);
            assert_eq!(args.out_dir, PathBuf::from("."));
        } else {
            panic!("wrong command");
        }
    }
}
