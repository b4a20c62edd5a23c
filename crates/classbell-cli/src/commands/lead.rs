use clap::Subcommand;

use super::{open_coordinator, resolve_now};

#[derive(Subcommand)]
pub enum LeadAction {
    /// Show the reminder lead time in minutes
    Get,
    /// Change the lead time and reschedule reminders
    Set {
        /// Minutes before class start; snapped to the configured step
        minutes: i64,
        #[arg(long)]
        at: Option<String>,
    },
}

pub async fn run(action: LeadAction) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = open_coordinator(None)?;
    match action {
        LeadAction::Get => println!("{}", coordinator.lead_minutes()?),
        LeadAction::Set { minutes, at } => {
            let change = coordinator.set_lead_minutes(minutes, resolve_now(at.as_deref())?).await?;
            if change.applied != change.requested {
                println!("lead time set to {} minutes (requested {})", change.applied, change.requested);
            } else {
                println!("lead time set to {} minutes", change.applied);
            }
            println!("reminders: {}", change.reminders.message());
        }
    }
    Ok(())
}
