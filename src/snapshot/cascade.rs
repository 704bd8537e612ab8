//! Hierarchical retention of snapshots.
//!
//! A [`Cascade`] is an ordered list of [`Tier`]s, finest interval first.
//! Each tier owns a fixed ring of slots. Snapshots are offered to the first
//! tier in ascending time order; a snapshot too close to the previously kept
//! one is rejected, and a snapshot written over an occupied slot displaces
//! the old occupant. Rejected and displaced snapshots are offered to the
//! next tier. Whatever falls out of the last tier is evicted.
//!
//! The rings and the `last_kept` cursors outlive a single call to
//! [`Cascade::classify`]: call [`Cascade::reset`] before reusing a cascade
//! on an unrelated set of snapshots.

use crate::snapshot::record::Snapshot;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use chrono::{DateTime, Duration, Utc};
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use std::fmt::{Debug, Formatter};
use std::num::NonZeroUsize;

#[derive(Clone, CopyGetters)]
pub struct Tier {
    #[getset(get_copy = "pub")]
    interval: Duration,
    slots: Vec<Option<Snapshot>>,
    next: usize,
    last_kept: Option<DateTime<Utc>>,
}

impl Tier {
    /// Fails for a zero capacity, the configuration must name at least one
    /// slot per bucket.
    pub fn new(interval: Duration, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidTier(format!(
                "size of the {}s bucket must be positive",
                interval.num_seconds()
            ))
        })?;
        if interval < Duration::zero() {
            return Err(Error::InvalidTier(format!(
                "interval {}s must not be negative",
                interval.num_seconds()
            )));
        }
        Ok(Self {
            interval,
            slots: vec![None; capacity.get()],
            next: 0,
            last_kept: None,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupants, oldest first.
    pub fn kept(&self) -> Vec<Snapshot> {
        self.slots
            .iter()
            .flatten()
            .cloned()
            .sorted_by_key(|s| *s.created())
            .collect_vec()
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.next = 0;
        self.last_kept = None;
    }

    /// Runs the whole ascending `input` through this tier and returns what
    /// the next tier has to look at, ascending.
    fn insert(&mut self, input: Vec<Snapshot>) -> Vec<Snapshot> {
        let mut passed_on = Vec::new();
        for snapshot in input {
            let created = *snapshot.created();
            let too_close = self
                .last_kept
                .is_some_and(|last| created.signed_duration_since(last) < self.interval);
            if self.slots.is_empty() || too_close {
                passed_on.push(snapshot);
                continue;
            }
            if let Some(displaced) = self.slots[self.next].replace(snapshot) {
                passed_on.push(displaced);
            }
            self.next = (self.next + 1) % self.slots.len();
            self.last_kept = Some(created);
        }
        passed_on.sort_by_key(|s| *s.created());
        passed_on
    }
}

impl Debug for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}s x{}: {:?}",
            self.interval.num_seconds(),
            self.capacity(),
            self.kept().iter().map(Snapshot::name).collect_vec()
        )
    }
}

/// Outcome of one classification pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Classification {
    /// Ring contents per tier after the pass, oldest first.
    kept: Vec<Vec<Snapshot>>,
    /// Snapshots that fell out of the last tier, oldest first.
    evicted: Vec<Snapshot>,
}

impl Classification {
    pub fn kept_flat(&self) -> Vec<Snapshot> {
        self.kept
            .iter()
            .flatten()
            .cloned()
            .sorted_by_key(|s| *s.created())
            .collect_vec()
    }

    pub fn into_evicted(self) -> Vec<Snapshot> {
        self.evicted
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cascade {
    tiers: Vec<Tier>,
}

impl Cascade {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Empties every tier so the next pass starts from scratch.
    pub fn reset(&mut self) {
        self.tiers.iter_mut().for_each(Tier::reset);
    }

    /// Offers `snapshots` to the tiers, finest first. Every tier sees its
    /// whole input before the next one starts.
    pub fn classify<I: IntoIterator<Item = Snapshot>>(
        &mut self,
        snapshots: I,
    ) -> Result<Classification> {
        let mut input = snapshots
            .into_iter()
            .sorted_by_key(|s| *s.created())
            .collect_vec();
        if let Some((a, _)) = input
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.created() == b.created())
        {
            return Err(Error::DuplicateSnapshot(*a.created()));
        }

        for tier in self.tiers.iter_mut() {
            input = tier.insert(input);
        }
        tracing::trace!("Cascade after pass: {:?}", self.tiers);

        Ok(Classification {
            kept: self.tiers.iter().map(Tier::kept).collect_vec(),
            evicted: input,
        })
    }
}

/// Classifies `snapshots` with a fresh cascade built from `tiers`.
pub fn classify<I: IntoIterator<Item = Snapshot>>(
    tiers: &[Tier],
    snapshots: I,
) -> Result<Classification> {
    let mut cascade = Cascade::new(tiers.to_vec());
    cascade.reset();
    cascade.classify(snapshots)
}
