use std::time::Duration;

use anyhow::Result;
use boardsync::client::{BoardSync, SyncReport};

use super::require_user;

fn status(ok: bool) -> console::StyledObject<&'static str> {
    if ok {
        console::style("ok").green()
    } else {
        console::style("unreachable, cache kept").yellow()
    }
}

fn print_report(report: SyncReport) {
    println!("  boards:        {}", status(report.boards));
    println!("  notifications: {}", status(report.notifications));
}

pub async fn cmd_sync(client: &BoardSync) -> Result<()> {
    let user = require_user(client)?;
    let report = client.sync().await;
    println!("{}", console::style("Sync").bold());
    print_report(report);
    println!(
        "  {} boards, {} unread notifications",
        client.boards.boards_for_user(&user.id).len(),
        client.notifications.unread_count(&user.id)
    );
    Ok(())
}

/// Runs both refresh loops in the foreground until Ctrl-C or `duration_secs`.
pub async fn cmd_watch(
    client: &BoardSync,
    interval: Duration,
    duration_secs: Option<u64>,
) -> Result<()> {
    let user = require_user(client)?;
    client.session.start_sync();
    println!(
        "Watching boards for {} every {}s. Press Ctrl-C to stop.",
        user.email,
        interval.as_secs()
    );

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                println!(
                    "{} {} boards, {} unread notifications",
                    console::style(chrono::Local::now().format("%H:%M:%S").to_string()).dim(),
                    client.boards.boards_for_user(&user.id).len(),
                    client.notifications.unread_count(&user.id)
                );
            }
        }
    }

    client.boards.stop_auto_refresh();
    client.notifications.stop_auto_refresh();
    println!("Stopped.");
    Ok(())
}
