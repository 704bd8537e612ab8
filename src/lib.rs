//! # k-snap
//!
//! Btrfs snapshots with tiered retention and incremental backups.
//!
//! ## Features
//!
//! - **Snapshots**: Read-only snapshots of a subvolume, one directory per timestamp
//! - **Retention**: Buckets of increasing interval, each keeping a fixed number of snapshots
//! - **Backups**: Incremental `btrfs send | btrfs receive` into another profile's storage
//! - **Pruning**: Deletes whatever the retention buckets do not keep
//! - **Dry Run**: Prints the btrfs commands instead of running them
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_snap::snapshot::actions::{create, prune};
//! use k_snap::snapshot::backend::btrfs::BtrfsBackend;
//! use k_snap::snapshot::snapshot_config::Config;
//!
//! let config = Config::load("/etc/snap/config.yml")?;
//! let profile = config.profile("home")?;
//! let backend = BtrfsBackend::builder().build();
//!
//! create("home", profile, &backend, chrono::Utc::now())?;
//! prune(profile, &backend)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod snapshot;
