#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for browsing OpenProject through the IMAP facade backend

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use imap_facade::{
    Backend, FacadeConfig, FetchItem, FetchedMessage, SearchCriteria, SeqSet, Session, StatusItem,
    UpdateKind, Updates,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facade-cli")]
#[command(about = "Browse OpenProject projects as IMAP mailboxes")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List mailboxes with message counts
    Mailboxes {
        /// Show only subscribed mailboxes
        #[arg(long)]
        subscribed: bool,
    },

    /// List messages of a mailbox
    Messages {
        /// Mailbox to list
        #[arg(long, default_value = "INBOX")]
        mailbox: String,

        /// Maximum number of messages to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Show only unseen messages
        #[arg(long)]
        unseen: bool,
    },

    /// Show a single message by UID
    Show {
        /// Message UID
        uid: u32,

        /// Mailbox containing the message
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
    },

    /// Print live updates until interrupted
    Watch,
}

#[derive(Serialize)]
struct MailboxRow {
    name: String,
    messages: u32,
    unseen: u32,
    attributes: Vec<String>,
}

#[derive(Serialize)]
struct MessageRow {
    uid: u32,
    date: Option<DateTime<Utc>>,
    flags: Vec<String>,
    from: String,
    subject: String,
}

impl MessageRow {
    fn from_fetched(msg: &FetchedMessage) -> Self {
        let envelope = msg.envelope.as_ref();
        Self {
            uid: msg.uid.unwrap_or_default(),
            date: msg.internal_date,
            flags: msg
                .flags
                .iter()
                .flatten()
                .map(ToString::to_string)
                .collect(),
            from: envelope
                .and_then(|env| env.from.first())
                .map(ToString::to_string)
                .unwrap_or_default(),
            subject: envelope
                .and_then(|env| env.subject.clone())
                .unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = FacadeConfig::from_env()?;
    let username = std::env::var("FACADE_USERNAME").context("FACADE_USERNAME not set")?;
    let api_key = std::env::var("FACADE_API_KEY").context("FACADE_API_KEY not set")?;

    let (backend, updates) = Backend::new(config)?;
    let watching = matches!(args.command, Command::Watch);
    let consumer = tokio::spawn(consume_updates(updates, watching, args.json));

    let session = backend.login(&username, &api_key).await?;

    match &args.command {
        Command::Mailboxes { subscribed } => {
            session.synchronize(false).await?;
            cmd_mailboxes(&session, &args, *subscribed).await?;
        }
        Command::Messages {
            mailbox,
            limit,
            unseen,
        } => {
            session.synchronize(false).await?;
            cmd_messages(&session, &args, mailbox, *limit, *unseen).await?;
        }
        Command::Show { uid, mailbox } => {
            session.synchronize(false).await?;
            cmd_show(&session, &args, mailbox, *uid).await?;
        }
        Command::Watch => {
            session.synchronize(false).await?;
            eprintln!("Watching updates for {username}, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    backend.shutdown().await;
    drop(backend);
    drop(session);
    consumer.abort();
    Ok(())
}

async fn consume_updates(mut updates: Updates, print: bool, json: bool) {
    while let Some(pending) = updates.recv().await {
        if print {
            let update = pending.update();
            let line = match &update.kind {
                UpdateKind::MailboxStatus(status) => format!(
                    "{} {}: {} messages, {} unseen",
                    update.username,
                    update.mailbox,
                    status.messages.unwrap_or_default(),
                    status.unseen.unwrap_or_default()
                ),
                UpdateKind::Message { uid, flags, .. } => format!(
                    "{} {}: UID {uid} flags {}",
                    update.username,
                    update.mailbox,
                    flags
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" ")
                ),
                UpdateKind::Expunge { seq_num } => format!(
                    "{} {}: expunged {seq_num}",
                    update.username, update.mailbox
                ),
            };
            if json {
                println!("{}", serde_json::json!({ "update": line }));
            } else {
                println!("{line}");
            }
        }
        pending.done();
    }
}

async fn cmd_mailboxes(session: &Session, args: &Args, subscribed: bool) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for mbox in session.list_mailboxes(subscribed).await {
        let status = mbox
            .status(&[StatusItem::Messages, StatusItem::Unseen], false)
            .await;
        rows.push(MailboxRow {
            name: status.name,
            messages: status.messages.unwrap_or_default(),
            unseen: status.unseen.unwrap_or_default(),
            attributes: mbox.info().await.attributes,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{:<30} {:>8} {:>8}", "Mailbox", "Messages", "Unseen");
        println!("{}", "-".repeat(48));
        for row in &rows {
            println!("{:<30} {:>8} {:>8}", truncate(&row.name, 30), row.messages, row.unseen);
        }
    }

    Ok(())
}

async fn cmd_messages(
    session: &Session,
    args: &Args,
    mailbox: &str,
    limit: usize,
    unseen: bool,
) -> anyhow::Result<()> {
    let mbox = session.get_mailbox(mailbox).await?;
    let set = if unseen {
        let mut set = SeqSet::new();
        for uid in mbox.search(true, &SearchCriteria::unseen()).await? {
            set.insert(uid, uid);
        }
        set
    } else {
        SeqSet::all()
    };

    let items = [
        FetchItem::Uid,
        FetchItem::InternalDate,
        FetchItem::Flags,
        FetchItem::Envelope,
    ];
    let mut rows = Vec::new();
    if !set.is_empty() {
        for fetched in mbox.list_messages(true, &set, &items).await {
            rows.push(MessageRow::from_fetched(&fetched?));
        }
    }
    // Newest first.
    rows.reverse();
    rows.truncate(limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_message_table(&rows);
    }

    Ok(())
}

async fn cmd_show(session: &Session, args: &Args, mailbox: &str, uid: u32) -> anyhow::Result<()> {
    let mbox = session.get_mailbox(mailbox).await?;
    let items = [
        FetchItem::Uid,
        FetchItem::InternalDate,
        FetchItem::Flags,
        FetchItem::Envelope,
        FetchItem::Section("BODY.PEEK[1]".into()),
    ];
    let fetched = mbox
        .list_messages(true, &SeqSet::single(uid), &items)
        .await
        .next()
        .with_context(|| format!("No message with UID {uid} in {mailbox}"))??;

    let row = MessageRow::from_fetched(&fetched);
    let text = fetched
        .sections
        .first()
        .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default();

    if args.json {
        let value = serde_json::json!({ "message": row, "text": text });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("UID:     {}", row.uid);
        if let Some(date) = row.date {
            println!("Date:    {}", date.format("%Y-%m-%d %H:%M:%S"));
        }
        println!("From:    {}", row.from);
        println!("Subject: {}", row.subject);
        println!("Flags:   {}", row.flags.join(" "));
        println!("\n--- Body ---\n");
        println!("{text}");
    }

    Ok(())
}

fn print_message_table(rows: &[MessageRow]) {
    if rows.is_empty() {
        println!("No messages found.");
        return;
    }

    println!("{:<8} {:<17} {:<20} {:<30} Subject", "UID", "Date", "Flags", "From");
    println!("{}", "-".repeat(100));

    for row in rows {
        println!(
            "{:<8} {:<17} {:<20} {:<30} {}",
            row.uid,
            row.date
                .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            truncate(&row.flags.join(" "), 20),
            truncate(&row.from, 28),
            truncate(&row.subject, 40),
        );
    }

    println!("\n{} message(s)", rows.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
