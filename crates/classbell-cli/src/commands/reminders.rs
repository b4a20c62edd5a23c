use clap::Subcommand;
use classbell_core::reminders::QueuedReminder;

use super::{open_coordinator, resolve_now};

#[derive(Subcommand)]
pub enum RemindersAction {
    /// List scheduled class reminders
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print and remove reminders whose time has come
    Due {
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Bring reminders in line with the stored timetable
    Sync {
        #[arg(long)]
        at: Option<String>,
    },
}

fn print_reminders(reminders: &[QueuedReminder], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(reminders)?);
        return Ok(());
    }
    for r in reminders {
        println!("{}  {}", r.trigger_instant.to_rfc3339(), r.payload.title);
        println!("    {}", r.payload.body);
    }
    Ok(())
}

pub async fn run(action: RemindersAction) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = open_coordinator(None)?;
    match action {
        RemindersAction::List { json } => {
            let pending = coordinator.notifier().pending()?;
            if pending.is_empty() && !json {
                println!("no reminders scheduled");
            } else {
                print_reminders(&pending, json)?;
            }
        }
        RemindersAction::Due { at, json } => {
            let fired = coordinator.notifier().due(resolve_now(at.as_deref())?)?;
            print_reminders(&fired, json)?;
        }
        RemindersAction::Sync { at } => {
            let summary = coordinator.reschedule(resolve_now(at.as_deref())?).await?;
            println!("{}", summary.message());
        }
    }
    Ok(())
}
