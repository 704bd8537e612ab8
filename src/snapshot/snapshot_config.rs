//! Profile configuration.
//!
//! ```yaml
//! profiles:
//!   home:
//!     subvolume: /home
//!     storage: /snapshots/home
//!     buckets:
//!       - { interval: 1h, size: 24 }
//!       - { interval: 1d, size: 7 }
//!   home-offsite:
//!     backup: home
//!     storage: /mnt/offsite/home
//!     buckets:
//!       - { interval: 1w, size: 52 }
//! ```
//!
//! Files ending in `.json` are read as JSON, anything else as YAML.

use crate::snapshot::cascade::Tier;
use crate::snapshot::interval::BucketInterval;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::{convert_error_vec, Result};
use crate::snapshot::result_error::WithMsg;
use crate::snapshot::validate::{validate_absolute_path, validate_not_blank, validate_profile_kind};
use bon::Builder;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

pub static DEFAULT_CONFIG_PATH: &str = "/etc/snap/config.yml";

/// One retention bucket: at most `size` snapshots, `interval` apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, Builder, CopyGetters)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct TierConfig {
    #[serde(alias = "Interval")]
    interval: BucketInterval,
    #[serde(alias = "Size")]
    #[validate(range(min = 1))]
    size: usize,
}

impl TierConfig {
    pub fn to_tier(&self) -> Result<Tier> {
        Tier::new(self.interval.duration(), self.size)
            .with_msg(format!("bucket {}", self.interval))
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_profile_kind))]
#[getset(get = "pub")]
pub struct ProfileConfig {
    /// Subvolume to snapshot. Unset for backup profiles.
    #[serde(default, alias = "Subvolume")]
    #[validate(custom(function = validate_absolute_path))]
    #[builder(into)]
    subvolume: Option<PathBuf>,
    /// Name of the profile whose snapshots are backed up here.
    #[serde(default, alias = "Backup")]
    #[validate(custom(function = validate_not_blank))]
    #[builder(into)]
    backup: Option<String>,
    /// Directory holding one sub-directory per snapshot.
    #[serde(alias = "Storage")]
    #[validate(custom(function = validate_absolute_path))]
    #[builder(into)]
    storage: PathBuf,
    /// Finest interval first.
    #[serde(default, alias = "Buckets")]
    #[validate(nested)]
    #[builder(default)]
    buckets: Vec<TierConfig>,
}

impl ProfileConfig {
    /// Fresh tiers for one cascade pass.
    pub fn tiers(&self) -> Result<Vec<Tier>> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, b)| {
                b.to_tier()
                    .with_msg(format!("bucket #{}/{}", i + 1, self.buckets.len()))
            })
            .collect()
    }

    pub fn is_backup(&self) -> bool {
        self.backup.is_some()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct Config {
    #[serde(alias = "Profiles")]
    #[builder(default)]
    profiles: BTreeMap<String, ProfileConfig>,
    /// Where this configuration was read from.
    #[serde(skip)]
    #[builder(default, into)]
    path: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(Error::from)
            .with_msg(format!("Open config failed: {:?}", path))?;
        let mut config: Config = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_reader(file).map_err(Error::from)
        } else {
            serde_yml::from_reader(file).map_err(Error::from)
        }
        .with_msg(format!("Parse config failed: {:?}", path))?;
        config.path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        config
            .check()
            .with_msg(format!("Config validation failed: {:?}", path))?;
        tracing::debug!("Loaded {} profiles from {:?}", config.profiles.len(), path);
        Ok(config)
    }

    /// Validates every profile and the references between them.
    pub fn check(&self) -> Result<()> {
        let errors = self
            .profiles
            .iter()
            .filter_map(|(name, profile)| {
                profile
                    .validate()
                    .map_err(Error::from)
                    .and_then(|_| profile.tiers().map(|_| ()))
                    .and_then(|_| match profile.backup() {
                        Some(source) => self.profile(source).map(|_| ()),
                        None => Ok(()),
                    })
                    .with_msg(format!("profile {name:?}"))
                    .err()
            })
            .collect_vec();
        convert_error_vec(errors)
    }

    pub fn profile(&self, name: &str) -> Result<&ProfileConfig> {
        self.profiles.get(name).ok_or_else(|| Error::UnknownProfile {
            name: name.to_string(),
            known: self.profiles.keys().cloned().collect_vec(),
            config: self.path.clone(),
        })
    }

    /// The profile a backup profile copies from.
    pub fn source_of(&self, name: &str) -> Result<&ProfileConfig> {
        let profile = self.profile(name)?;
        let source = profile.backup().as_deref().ok_or_else(|| Error::WrongProfileKind {
            name: name.to_string(),
            actual: "not a backup profile",
        })?;
        self.profile(source)
    }
}
