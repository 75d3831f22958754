//! CLI argument parsing for the quote-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quote-worker", about = "Itinerary sequencing and pricing worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Print the transport catalog and exit
    Catalog,
    /// Quote a request file offline and print the snapshot as JSON
    Quote {
        /// Path to a JSON quote request
        file: PathBuf,
        /// Print only the price breakdown
        #[arg(long)]
        pricing_only: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["quote-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_and_catalog_parse() {
        let cli = Cli::parse_from(["quote-worker", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
        let cli = Cli::parse_from(["quote-worker", "catalog"]);
        assert!(matches!(cli.command, Some(Command::Catalog)));
    }

    #[test]
    fn test_cli_quote_takes_file() {
        let cli = Cli::parse_from(["quote-worker", "quote", "acme.json", "--pricing-only"]);
        match cli.command {
            Some(Command::Quote { file, pricing_only }) => {
                assert_eq!(file, PathBuf::from("acme.json"));
                assert!(pricing_only);
            }
            _ => panic!("expected quote command"),
        }
        assert!(Cli::try_parse_from(["quote-worker", "quote"]).is_err());
    }
}
