use std::path::PathBuf;

use clap::Args;
use classbell_core::{Config, FileTimetableSource, HttpTimetableSource, ReloadOutcome, TimetableSource};

use super::{open_coordinator, resolve_now};

#[derive(Args)]
pub struct ReloadArgs {
    /// Read the timetable from a JSON file instead of the API
    #[arg(long, conflicts_with = "url")]
    pub file: Option<PathBuf>,
    /// Override the configured API endpoint
    #[arg(long)]
    pub url: Option<String>,
    /// Bearer token for the API
    #[arg(long, env = "CLASSBELL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Skip the fetch if the last reload is recent
    #[arg(long)]
    pub if_stale: bool,
    /// Treat this RFC 3339 instant as "now"
    #[arg(long)]
    pub at: Option<String>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ReloadArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source: Box<dyn TimetableSource> = match (&args.file, &args.url) {
        (Some(path), _) => Box::new(FileTimetableSource::new(path)),
        (None, url) => {
            let config = Config::load()?;
            let endpoint = match url {
                Some(url) => url::Url::parse(url).map_err(|e| format!("invalid --url '{url}': {e}"))?,
                None => config.endpoint()?,
            };
            Box::new(HttpTimetableSource::new(endpoint, args.token.clone(), config.timeout())?)
        }
    };

    let coordinator = open_coordinator(Some(source))?;
    let now = resolve_now(args.at.as_deref())?;
    let outcome = if args.if_stale {
        coordinator.reload_if_stale(now).await?
    } else {
        coordinator.reload(now).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        ReloadOutcome::Applied(report) => {
            println!("{}", report.message());
            for skipped in &report.normalization.skipped {
                println!("  skipped entry #{}: {}", skipped.index, skipped.reason);
            }
            for failure in &report.reminders.failures {
                println!("  reminder {}: {}", failure.identifier, failure.message);
            }
        }
        ReloadOutcome::Superseded { sequence } => println!("reload #{sequence} was superseded"),
        ReloadOutcome::Fresh { last_reload_at } => {
            println!("timetable is fresh (last reload {})", last_reload_at.to_rfc3339())
        }
    }
    Ok(())
}
