//! weld-core library.
//!
//! Field-value reconciliation for Redmine-style issue trackers: a codec
//! that normalizes a field's raw content into a token set, a per-project
//! user directory, the merge engine that decides whether a target field
//! needs updating, and the batch runner that drives the pipeline over a
//! collaborator-supplied issue stream.
//!
//! # Conventions
//!
//! - **Errors**: fallible operations return `Result<_, WeldError>`;
//!   per-issue failures are contained by the batch runner, only
//!   configuration failures propagate.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod directory;
pub mod error;
pub mod field;
pub mod reconcile;
pub mod record;
pub mod runner;

pub use directory::UserDirectory;
pub use error::WeldError;
pub use field::{FieldValue, Separator, TokenSet};
pub use reconcile::Outcome;
pub use record::{Issue, Membership};
pub use runner::{BatchRunner, CopyOptions, RunSummary, StatusFilter};
