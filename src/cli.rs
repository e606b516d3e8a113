use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use inquire::Text;
use std::sync::Arc;

use crate::context::TimeAnchor;
use crate::handlers::assistant::{AssistantHandler, ConfirmCommand};
use crate::models::response::ConfirmReply;

#[derive(Parser, Debug)]
#[command(name = "calenBot", about = "Natural language calendar assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message and print the reply
    Send { text: String },
    /// Interactive chat session against the local clock
    Chat,
}

pub async fn run_send(handler: Arc<AssistantHandler>, tz: Tz, owner_id: &str, text: &str) {
    let anchor = TimeAnchor::local(tz);
    let response = handler.process(owner_id, text, &anchor).await;
    println!("{}", response.message);
    if let Some(events) = &response.events {
        for event in events {
            println!("  - {} ({})", event.title, event.start_date.to_rfc3339());
        }
    }
}

pub async fn run_chat(handler: Arc<AssistantHandler>, tz: Tz, owner_id: &str) {
    println!("Chat with your calendar. Say \"confirm\", \"cancel\", or \"quit\".");
    loop {
        let line = match Text::new("you:").prompt() {
            Ok(line) => line,
            Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.to_lowercase().as_str() {
            "quit" | "exit" | "bye" => break,
            "confirm" | "yes" | "y" => {
                reply(handler.confirm(owner_id, ConfirmCommand::Confirm).await);
            }
            "cancel" | "no" | "n" => {
                reply(handler.confirm(owner_id, ConfirmCommand::Cancel).await);
            }
            _ => {
                let anchor = TimeAnchor::local(tz);
                let response = handler.process(owner_id, trimmed, &anchor).await;
                println!("bot: {}", response.message);
                if let Some(events) = &response.events {
                    for event in events {
                        println!("  - {} ({})", event.title, event.start_date.to_rfc3339());
                    }
                }
            }
        }
    }
    println!("Goodbye.");
}

fn reply(result: crate::error::AssistantResult<ConfirmReply>) {
    match result {
        Ok(ConfirmReply::Message(message)) => println!("bot: {}", message.message),
        Ok(ConfirmReply::Proposal(proposal)) => println!("bot: {}", proposal.message),
        Err(err) => println!("bot: {}", err.user_message()),
    }
}
