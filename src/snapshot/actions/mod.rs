//! What the command line can do with a profile.
//!
//! Every action takes the profile and collaborators it needs explicitly and
//! builds its own cascade, so nothing leaks from one action into the next
//! within the same run.

pub mod backup;
pub mod create;
pub mod list;
pub mod prune;

pub use backup::backup;
pub use create::create;
pub use list::{list, list_files};
pub use prune::prune;
