//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Focus tracker sync client.
///
/// Streams foreground-application changes to the focus server and shows the
/// session state it reports back.
#[derive(Debug, Parser)]
#[command(name = "trickle", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to the server and sync activations read from stdin.
    ///
    /// Each line is an application name, optionally prefixed by an RFC 3339
    /// timestamp and a tab. Stops on Ctrl-C or end of input and prints the
    /// local usage report.
    Run,

    /// Decode a status payload and print it.
    Decode {
        /// File containing the payload (reads stdin if omitted).
        path: Option<PathBuf>,

        /// Output the decoded snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decode_with_json_flag() {
        let cli = Cli::try_parse_from(["trickle", "decode", "status.json", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Decode { path, json }) => {
                assert_eq!(path, Some(PathBuf::from("status.json")));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["trickle", "run", "-v", "--config", "c.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Some(Commands::Run)));
    }
}
