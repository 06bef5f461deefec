//! CLI Module
//!
//! Command-line driver that exercises the bridge the way the engine does.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default chunk size for streamed reads (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Nueva FS Bridge - drive the engine file callbacks from the command line
#[derive(Parser, Debug)]
#[command(name = "nueva-fsbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory identifiers are resolved against
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a file through synchronous read callbacks and write it to stdout
    #[command(name = "cat")]
    Cat {
        /// File identifier, relative to the root
        identifier: String,

        /// Bytes per read call
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk: usize,
    },

    /// Read a file through sequential asynchronous reads
    #[command(name = "stream")]
    Stream {
        /// File identifier, relative to the root
        identifier: String,

        /// Bytes per async read
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk: usize,
    },

    /// SHA-256 of a file read with concurrent asynchronous reads
    #[command(name = "checksum")]
    Checksum {
        /// File identifier, relative to the root
        identifier: String,

        /// Bytes per async read
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk: usize,

        /// Async reads kept in flight at once
        #[arg(long, default_value_t = 8)]
        depth: usize,
    },

    /// Open files and print bridge statistics as JSON
    #[command(name = "stats")]
    Stats {
        /// File identifiers, relative to the root
        identifiers: Vec<String>,
    },
}
