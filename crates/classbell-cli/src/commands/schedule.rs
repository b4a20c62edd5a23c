use clap::Subcommand;

use super::{open_coordinator, resolve_now, session_line};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Show remaining sessions grouped by day
    List {
        /// Treat this RFC 3339 instant as "now"
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the next session to attend
    Next {
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = open_coordinator(None)?;
    match action {
        ScheduleAction::List { at, json } => {
            let sections = coordinator.sections(resolve_now(at.as_deref())?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sections)?);
            } else if sections.is_empty() {
                println!("no upcoming sessions");
            } else {
                for section in &sections {
                    println!("{}", section.title);
                    for session in &section.sessions {
                        println!("  {}", session_line(session, coordinator.config()));
                    }
                }
            }
        }
        ScheduleAction::Next { at, json } => {
            let next = coordinator.upcoming(resolve_now(at.as_deref())?)?;
            match (next, json) {
                (next, true) => println!("{}", serde_json::to_string_pretty(&next)?),
                (Some(session), false) => {
                    println!("{} ({})", session.day_of_week, session.date);
                    println!("  {}", session_line(&session, coordinator.config()));
                }
                (None, false) => println!("no upcoming sessions"),
            }
        }
    }
    Ok(())
}
