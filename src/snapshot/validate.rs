//! Validation functions for configuration values.

use crate::snapshot::snapshot_config::ProfileConfig;
use std::path::Path;
use validator::ValidationError;

pub fn validate_absolute_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    let path = path.as_ref();
    if !path.is_absolute() {
        return Err(ValidationError::new("RelativePath")
            .with_message(format!("{:?} must be an absolute path", path).into()));
    }

    Ok(())
}

pub fn validate_not_blank<S: AsRef<str>>(s: S) -> Result<(), ValidationError> {
    if s.as_ref().trim().is_empty() {
        return Err(ValidationError::new("Blank").with_message("must not be blank".into()));
    }

    Ok(())
}

/// A profile either snapshots a subvolume or backs up another profile.
pub fn validate_profile_kind(profile: &ProfileConfig) -> Result<(), ValidationError> {
    match (profile.subvolume(), profile.backup()) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (None, None) => Err(ValidationError::new("ProfileKind")
            .with_message("either subvolume or backup must be set".into())),
        (Some(_), Some(_)) => Err(ValidationError::new("ProfileKind")
            .with_message("subvolume and backup are mutually exclusive".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_absolute_path() {
        assert!(validate_absolute_path("/snapshots").is_ok());
        assert!(validate_absolute_path("snapshots").is_err());
        assert!(validate_absolute_path("").is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("home").is_ok());
        assert!(validate_not_blank("  ").is_err());
    }
}
