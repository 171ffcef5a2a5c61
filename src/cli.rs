// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// `brokerd` — a stdio JSON-RPC broker between a frontend and a chat model,
/// augmenting turns with codebase retrieval and tool calls.
#[derive(Parser, Debug)]
#[command(name = "brokerd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to a config file, merged over the search-path defaults.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging regardless of `RUST_LOG`.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the JSON-RPC dispatcher over stdin/stdout (default).
    Serve,
    /// Drive the turn engine directly from an interactive stdin prompt,
    /// bypassing the JSON-RPC wire. For local manual testing.
    Repl,
    /// Print a shell completion script and exit.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "brokerd", &mut std::io::stdout());
}
