//! # Alp
//!
//! Command-line front end for the Alp record registry. The binary in
//! `main.rs` only installs logging and hands the parsed [`cli::Cli`] to
//! [`cli::execute`]; everything else lives here so it can be tested.

pub mod cli;
pub mod config;
