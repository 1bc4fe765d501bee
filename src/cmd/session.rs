//! Sign-in commands: `boardsync login|register|logout|whoami`.

use anyhow::{Result, bail};
use boardsync::client::BoardSync;
use boardsync::store::AuthOutcome;

fn finish(client: &BoardSync, outcome: AuthOutcome) -> Result<()> {
    if !outcome.ok {
        bail!(
            "{}",
            outcome.message.unwrap_or_else(|| "Sign-in failed".to_string())
        );
    }
    if let Some(user) = client.session.current_user() {
        println!(
            "{} Signed in as {} <{}>",
            console::style("✓").green(),
            console::style(&user.name).bold(),
            user.email
        );
    }
    Ok(())
}

pub async fn cmd_login(client: &BoardSync, email: &str, password: &str) -> Result<()> {
    let outcome = client.session.login(email, password).await;
    finish(client, outcome)
}

pub async fn cmd_register(
    client: &BoardSync,
    name: &str,
    email: &str,
    password: &str,
) -> Result<()> {
    let outcome = client.session.register(name, email, password).await;
    finish(client, outcome)
}

pub fn cmd_logout(client: &BoardSync) {
    match client.session.current_user() {
        Some(user) => {
            client.session.logout();
            println!("Signed out {}.", user.email);
        }
        None => println!("Not signed in."),
    }
}

pub fn cmd_whoami(client: &BoardSync) {
    match client.session.current_user() {
        Some(user) => println!("{} <{}> ({})", user.name, user.email, user.id),
        None => println!("Not signed in."),
    }
}
