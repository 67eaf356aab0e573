use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use chrono::{Local, Timelike};
use fitvida::cli::{parse_args, read_json_file, Command};
use fitvida::config::RelayConfig;
use fitvida::logging::LoggingConfig;
use fitvida::metrics::MetricsReport;
use fitvida::profile::{DailyStats, UserProfile};
use fitvida::relay::food_image::{analyze_food_image, FoodImageRequest};
use fitvida::relay::food_search::search_food;
use fitvida::relay::voice::{interpret_voice_command, VoiceCommandRequest};
use fitvida::server::{self, AppState};
use fitvida::storage::{self, InMemoryStorage, SampleData};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    LoggingConfig::from_env().init()?;

    let cli_args = parse_args();
    let config = RelayConfig::from_env().context("Invalid configuration")?;

    match cli_args.command {
        Command::Serve { bind, seed_demo } => {
            let provider = config.build_provider()?;
            info!(
                model = provider.model(),
                url = provider.url(),
                formula = %config.formula,
                "starting FitVida API"
            );

            let store = Arc::new(InMemoryStorage::new());
            if seed_demo {
                let today = Local::now().date_naive();
                let user_id = storage::seed(store.as_ref(), &SampleData, today)
                    .await
                    .context("Failed to seed demo data")?;
                info!(user_id = %user_id, "demo data loaded");
            }

            let state = AppState::new(Arc::new(provider), store, config.formula);
            server::run(state, bind.unwrap_or(config.bind_addr)).await?;
        }
        Command::Goals {
            profile,
            stats,
            hour,
            formula,
        } => {
            let user: UserProfile = read_json_file(&profile).await?;
            let day: DailyStats = match stats {
                Some(path) => read_json_file(&path).await?,
                None => DailyStats::empty(Local::now().date_naive()),
            };
            let hour = hour.unwrap_or_else(|| Local::now().hour());
            let report = MetricsReport::compute(&user, &day, hour, formula.unwrap_or(config.formula));
            print_json(&report)?;
        }
        Command::Search { query } => {
            let provider = config.build_provider()?;
            let found = search_food(&provider, Some(query.as_str()))
                .await
                .with_context(|| format!("Food search for '{}' failed", query))?;
            print_json(&found)?;
        }
        Command::AnalyzePhoto { file } => {
            let provider = config.build_provider()?;
            let bytes = fs::read(&file)
                .await
                .with_context(|| format!("Failed to read image '{}'", file.display()))?;
            let request = FoodImageRequest {
                image: Some(general_purpose::STANDARD.encode(bytes)),
                mime_type: Some(mime_type_for(&file).to_string()),
            };
            let analysis = analyze_food_image(&provider, &request)
                .await
                .context("Photo analysis failed")?;
            print_json(&analysis)?;
        }
        Command::Voice { command } => {
            let provider = config.build_provider()?;
            let request = VoiceCommandRequest {
                command: Some(command),
            };
            let result = interpret_voice_command(&provider, &request).await?;
            print_json(&result)?;
        }
    }

    Ok(())
}
