use anyhow::Result;
use boardsync::client::BoardSync;
use chrono::{Local, TimeZone};

use super::require_user;
use crate::NotificationCommands;

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn cmd_notifications(
    client: &BoardSync,
    command: Option<NotificationCommands>,
) -> Result<()> {
    let user = require_user(client)?;
    let store = &client.notifications;

    match command.unwrap_or(NotificationCommands::List { unread: false }) {
        NotificationCommands::List { unread } => {
            if !store.fetch().await {
                println!(
                    "{}",
                    console::style("Remote unreachable, showing cached notifications.").dim()
                );
            }
            let items = if unread {
                store.unread_for_user(&user.id)
            } else {
                store.all_for_user(&user.id)
            };
            if items.is_empty() {
                println!("No notifications.");
                return Ok(());
            }
            for item in &items {
                let marker = if item.read {
                    console::style(" ").dim()
                } else {
                    console::style("●").cyan()
                };
                println!(
                    "{} {} {}",
                    marker,
                    console::style(format_time(item.created_at)).dim(),
                    item.message
                );
            }
            println!();
            println!("{} unread", store.unread_count(&user.id));
        }
        NotificationCommands::ReadAll => {
            store.mark_all_read(&user.id).await;
            println!(
                "{} Marked all notifications read ({} unread)",
                console::style("✓").green(),
                store.unread_count(&user.id)
            );
        }
    }
    Ok(())
}
