//! Decides which source snapshots a backup profile still needs.
//!
//! Snapshots are matched by creation time only. A snapshot missing at the
//! destination is *needed*; one present on both sides is a *base* usable
//! for incremental sends. Needed snapshots the destination's own retention
//! would evict right away are *unwanted* and never sent.

use crate::snapshot::cascade::{Cascade, Tier};
use crate::snapshot::record::Snapshot;
use crate::snapshot::result_error::result::Result;
use chrono::{DateTime, Utc};
use getset::Getters;
use itertools::Itertools;
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupPlan {
    /// Needed and wanted, oldest first. Must be sent in this order.
    to_send: Vec<Snapshot>,
    /// Source-side records of snapshots present on both ends, oldest first.
    bases: Vec<Snapshot>,
    /// Needed but evicted by the simulated destination retention.
    unwanted: Vec<Snapshot>,
}

impl BackupPlan {
    pub fn new(source: &[Snapshot], dest: &[Snapshot], dest_tiers: &[Tier]) -> Result<Self> {
        let at_dest: HashSet<DateTime<Utc>> = dest.iter().map(|s| *s.created()).collect();
        let (have, need): (Vec<Snapshot>, Vec<Snapshot>) = source
            .iter()
            .cloned()
            .partition(|s| at_dest.contains(s.created()));

        // Throwaway cascade: what would the destination keep if everything
        // needed had already arrived?
        let mut simulation = Cascade::new(dest_tiers.to_vec());
        let evicted: HashSet<DateTime<Utc>> = simulation
            .classify(dest.iter().cloned().chain(need.iter().cloned()))?
            .evicted()
            .iter()
            .map(|s| *s.created())
            .collect();
        simulation.reset();

        let (unwanted, to_send): (Vec<Snapshot>, Vec<Snapshot>) = need
            .into_iter()
            .sorted_by_key(|s| *s.created())
            .partition(|s| evicted.contains(s.created()));

        let plan = Self {
            to_send,
            bases: have.into_iter().sorted_by_key(|s| *s.created()).collect_vec(),
            unwanted,
        };
        tracing::info!(
            "Backup plan: {} to send, {} unwanted, {} bases",
            plan.to_send.len(),
            plan.unwanted.len(),
            plan.bases.len()
        );
        Ok(plan)
    }

    pub fn into_parts(self) -> (Vec<Snapshot>, Vec<Snapshot>) {
        (self.to_send, self.bases)
    }
}

/// The newest base strictly older than `snapshot`, used as the delta parent.
pub fn parent_of<'a>(snapshot: &Snapshot, bases: &'a [Snapshot]) -> Option<&'a Snapshot> {
    bases
        .iter()
        .filter(|b| b.created() < snapshot.created())
        .max_by_key(|b| *b.created())
}
