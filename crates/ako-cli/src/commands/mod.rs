//! Subcommand implementations.

pub mod ci;
pub mod commit;
pub mod init;
