use chrono::Utc;
use clap::Parser;
use k_snap::snapshot::actions::{backup, create, list, list_files, prune};
use k_snap::snapshot::backend::btrfs::{BtrfsBackend, DEFAULT_BTRFS_BIN};
use k_snap::snapshot::backend::ExecMode;
use k_snap::snapshot::result_error::error::Error;
use k_snap::snapshot::result_error::result::Result;
use k_snap::snapshot::result_error::WithMsg;
use k_snap::snapshot::snapshot_config::{Config, DEFAULT_CONFIG_PATH};
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Create, back up, prune and list btrfs snapshots of a profile
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short = 'C', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// btrfs binary to run
    #[arg(short = 'B', long, default_value = DEFAULT_BTRFS_BIN)]
    btrfs_bin: PathBuf,
    /// Create a new snapshot
    #[arg(short, long)]
    create: bool,
    /// Copy missing snapshots from the source profile
    #[arg(short, long)]
    backup: bool,
    /// Delete snapshots the retention buckets do not keep
    #[arg(short = 'X', long)]
    prune: bool,
    /// List all snapshots
    #[arg(short, long)]
    list: bool,
    /// List all distinct versions of the files at a path
    #[arg(short = 'L', long, value_name = "PATH")]
    list_files: Option<PathBuf>,
    /// Print the btrfs commands instead of running them
    #[arg(long)]
    dry_run: bool,
    /// Print the btrfs commands before running them
    #[arg(short, long)]
    verbose: bool,
    /// Profile to act on
    profile: String,
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let profile = config.profile(&args.profile)?;
    let backend = BtrfsBackend::builder()
        .binary(&args.btrfs_bin)
        .exec_mode(ExecMode::from_flags(args.dry_run, args.verbose))
        .build();
    let mut stdout = std::io::stdout().lock();

    if args.create {
        let snapshot = create(&args.profile, profile, &backend, Utc::now())
            .with_msg("cannot create snapshot")?;
        info!("Created {}", snapshot);
    }
    if args.backup {
        let published = backup(&config, &args.profile, &backend).with_msg("cannot backup")?;
        info!("Backed up {} snapshots", published.len());
    }
    if args.prune {
        let evicted = prune(profile, &backend).with_msg("cannot prune")?;
        info!("Pruned {} snapshots", evicted.len());
    }
    if args.list {
        list(profile, Utc::now(), &mut stdout).with_msg("cannot list snapshots")?;
    }
    if let Some(path) = &args.list_files {
        list_files(profile, path, Utc::now(), &mut stdout).with_msg("cannot list files")?;
    }
    stdout.flush().map_err(Error::from)
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{}: {e}", args.profile);
        exit(1);
    }
}
