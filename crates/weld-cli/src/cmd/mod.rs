//! Subcommand implementations. Each module owns its clap `Args` struct
//! and a `run_*` entry point called from `main`.

pub mod copy;
pub mod spent;
pub mod survey;
pub mod sweep;
