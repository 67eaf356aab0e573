use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::metrics::BmrFormula;

#[derive(Parser, Debug)]
#[command(author, version, about = "Nutrition metrics and AI relay for FitVida", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Seed storage with the demo user before serving
        #[arg(long)]
        seed_demo: bool,
    },
    /// Print calorie, water and deficiency metrics for a profile
    Goals {
        /// JSON file holding the user profile
        #[arg(short, long)]
        profile: PathBuf,
        /// JSON file holding today's stats (defaults to an empty day)
        #[arg(short, long)]
        stats: Option<PathBuf>,
        /// Hour of day used by the time-based rules (defaults to now)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,
        /// BMR formula: mifflin or harris-benedict (overrides BMR_FORMULA)
        #[arg(long)]
        formula: Option<BmrFormula>,
    },
    /// Look up nutrition facts for a food
    Search {
        query: String,
    },
    /// Identify foods and calories in a photo
    AnalyzePhoto {
        file: PathBuf,
    },
    /// Interpret a transcribed voice command
    Voice {
        command: String,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Reads and deserializes a JSON input file such as a profile or day log.
pub async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goals_arguments() {
        let cli = Cli::try_parse_from([
            "fitvida", "goals", "--profile", "me.json", "--hour", "19", "--formula", "harris-benedict",
        ])
        .unwrap();
        match cli.command {
            Command::Goals {
                profile,
                stats,
                hour,
                formula,
            } => {
                assert_eq!(profile, PathBuf::from("me.json"));
                assert_eq!(stats, None);
                assert_eq!(hour, Some(19));
                assert_eq!(formula, Some(BmrFormula::HarrisBenedict));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_out_of_range_hour() {
        assert!(Cli::try_parse_from(["fitvida", "goals", "--profile", "p.json", "--hour", "24"]).is_err());
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from(["fitvida", "serve", "--bind", "0.0.0.0:8080", "--seed-demo"]).unwrap();
        match cli.command {
            Command::Serve { bind, seed_demo } => {
                assert_eq!(bind, Some("0.0.0.0:8080".parse().unwrap()));
                assert!(seed_demo);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
