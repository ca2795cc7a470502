//! Outbox command - show emails queued by account flows

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let emails = ctx.mailer.recent(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&emails)?);
        return Ok(());
    }

    if emails.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for email in &emails {
        println!(
            "{} {} {}",
            email.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            email.recipient.cyan(),
            email.subject.bold()
        );
        for line in email.body.lines() {
            println!("    {}", line);
        }
        println!();
    }
    output::info(&format!("{} message(s)", emails.len()));
    Ok(())
}
