//! Terminal display utilities for the ledgerchat client
#![allow(dead_code)] // Reserved display functions

use chrono::{DateTime, Local};
use colored::Colorize;

use ledgerchat_core::{ChatMessage, DeliveryStatus, MessageBody, PeerAddress};

/// Print the application banner
pub fn print_banner() {
    println!();
    println!(
        "{}",
        "╔═══════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║       Ledgerchat - Contract-Backed Messaging      ║".cyan()
    );
    println!(
        "{}",
        "╚═══════════════════════════════════════════════════╝".cyan()
    );
    println!();
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg.dimmed());
}

/// Print an error message
pub fn print_error(msg: &str) {
    println!("{} {}", "✗".red().bold(), msg.red());
}

/// Print the chat prompt
pub fn print_prompt(peer: &PeerAddress) {
    print!("{} {} ", format!("[{}]", peer.truncate()).cyan(), ">".green());
}

/// Print interactive mode help
pub fn print_interactive_help() {
    println!();
    println!("{}", "Commands:".yellow().bold());
    println!("  {}  - Send a message (just type)", "<message>".cyan());
    println!("  {}   - Show the conversation", "/history".cyan());
    println!("  {}    - Show peers with unread messages", "/unread".cyan());
    println!("  {}      - Acknowledge unread messages", "/read".cyan());
    println!("  {}    - Dump the conversation as JSON", "/export".cyan());
    println!("  {}      - Show this help", "/help".cyan());
    println!("  {}      - Exit", "/quit".cyan());
    println!();
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| {
            let local: DateTime<Local> = utc.into();
            local.format("%H:%M").to_string()
        })
        .unwrap_or_else(|| "--:--".to_string())
}

/// Whether a message body looks like an image link, for an inline hint
pub fn is_image_url(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Decode a peer's deterministic `#rrggbb` color into channels
fn peer_rgb(peer: &PeerAddress) -> (u8, u8, u8) {
    let hex_color = peer.color();
    let channel = |i: usize| u8::from_str_radix(&hex_color[i..i + 2], 16).unwrap_or(0x88);
    (channel(1), channel(3), channel(5))
}

fn status_marker(message: &ChatMessage) -> String {
    match message.status {
        DeliveryStatus::Pending => "…".dimmed().to_string(),
        DeliveryStatus::Failed => "✗".red().to_string(),
        DeliveryStatus::Sent if message.is_read => "✓✓".green().to_string(),
        DeliveryStatus::Sent => "✓".dimmed().to_string(),
    }
}

/// Print one chat message
pub fn print_message(message: &ChatMessage, local: &PeerAddress) {
    let is_self = &message.sender == local;
    let label = format!("{}:", message.sender.truncate());
    let label = if is_self {
        label.cyan().bold()
    } else {
        let (r, g, b) = peer_rgb(&message.sender);
        label.truecolor(r, g, b).bold()
    };

    match &message.body {
        MessageBody::Text(text) => {
            print!(
                "{} {} {} {}",
                format_time(message.timestamp).dimmed(),
                label,
                text,
                status_marker(message)
            );
            if is_image_url(text) {
                print!(" {}", "(image)".dimmed());
            }
            println!();
        }
        MessageBody::Undecryptable => {
            println!(
                "{} {} {}",
                format_time(message.timestamp).dimmed(),
                label,
                "[undecryptable message]".dimmed().italic()
            );
        }
    }
}

/// Print a full conversation snapshot
pub fn print_history(messages: &[ChatMessage], peer: &PeerAddress, local: &PeerAddress) {
    println!();
    println!(
        "{} {} {}",
        "─".repeat(10).dimmed(),
        format!("{} ({} messages)", peer.truncate(), messages.len())
            .yellow()
            .bold(),
        "─".repeat(10).dimmed()
    );
    for message in messages {
        print_message(message, local);
    }
    println!();
}

/// Print the unread badge list
pub fn print_unread(peers: &[PeerAddress]) {
    if peers.is_empty() {
        println!("{}", "No unread conversations.".dimmed());
        return;
    }
    println!();
    println!("{}", "Unread conversations:".yellow().bold());
    for peer in peers {
        let (r, g, b) = peer_rgb(peer);
        println!("  {} {}", "●".truecolor(r, g, b), peer.truncate().bold());
    }
    println!();
}

/// Print demo mode banner
pub fn print_demo_mode() {
    println!();
    println!(
        "{}",
        "════════════════════════════════════════════════════".yellow()
    );
    println!(
        "{}",
        "  Running in DEMO mode - simulated in-memory chain  ".yellow()
    );
    println!(
        "{}",
        "════════════════════════════════════════════════════".yellow()
    );
    println!();
}
