use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("profile {name:?} unknown, known profiles are: {} (loaded from {config:?})", known.iter().map(|k| format!("{k:?}")).join(", "))]
    UnknownProfile {
        name: String,
        known: Vec<String>,
        config: PathBuf,
    },
    #[error("profile {name:?} is {actual}")]
    WrongProfileKind { name: String, actual: &'static str },
    #[error("invalid bucket: {0}")]
    InvalidTier(String),
    #[error("invalid interval {text:?}: {reason}")]
    InvalidInterval { text: String, reason: String },
    #[error("snapshot created at {0} already exists")]
    DuplicateSnapshot(DateTime<Utc>),
    #[error("{program}: failed with {status}{}", stderr.as_ref().map(|s| format!(" (stderr: {s:?})")).unwrap_or_default())]
    Command {
        program: String,
        status: String,
        stderr: Option<String>,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { error: Box<Error>, fn_name: String },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Strips context wrappers to tell whether this error is only the
    /// echo of a peer's failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::WithMsg { error, .. } | Error::WithFnName { error, .. } => {
                error.is_cancelled()
            }
            Error::LotsOfError(v) => v.iter().all(Error::is_cancelled),
            _ => false,
        }
    }
}
