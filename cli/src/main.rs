//! Ledgerchat - terminal messenger over a contract ledger
//!
//! Drives the conversation engine against an in-memory chain so the full
//! loop is observable from a terminal: backfill, live delivery,
//! optimistic sends, read receipts and deletion.
//!
//! ## Usage
//!
//! ```bash
//! # Scripted two-party conversation
//! ledgerchat demo
//!
//! # Interactive session with a simulated partner
//! ledgerchat chat
//! ledgerchat chat 0x70997970c51812dc3a010c7d01b50e0d17dc79c8
//! ```

mod display;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use display::*;
use ledgerchat_core::{MessageCodec, PeerAddress, XorCodec};
use ledgerchat_sync::{
    ConversationStore, MockChain, RemoteLedger, SyncConfig, SyncController,
};

/// Default session identity (a well-known devnet account)
const DEFAULT_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
/// Default counterpart for demo and chat sessions
const DEFAULT_PARTNER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

/// Ledgerchat - contract-backed peer-to-peer messaging
#[derive(Parser)]
#[command(name = "ledgerchat")]
#[command(about = "Contract-backed peer-to-peer messaging")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Your ledger address
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    address: String,

    /// Shared codec key for message bodies
    #[arg(short, long, default_value = "ledgerchat")]
    key: String,

    /// Enable verbose engine logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scripted two-party conversation on an in-memory chain
    Demo,
    /// Interactive session with a simulated partner
    Chat {
        /// Partner address
        #[arg(default_value = DEFAULT_PARTNER)]
        peer: String,
    },
}

/// Build a store + controller pair for one identity on the chain
fn session(chain: &MockChain, local: PeerAddress, key: &str) -> Arc<SyncController> {
    let codec = Arc::new(XorCodec::new(key));
    let store = Arc::new(ConversationStore::new(local.clone(), codec.clone()));
    SyncController::new(
        local.clone(),
        Arc::new(chain.client(local)),
        store,
        codec,
        SyncConfig::default(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let local = PeerAddress::parse(&cli.address)
        .with_context(|| format!("invalid local address: {}", cli.address))?;

    match cli.command {
        Commands::Demo => cmd_demo(local, &cli.key).await,
        Commands::Chat { peer } => {
            let peer = PeerAddress::parse(&peer)
                .with_context(|| format!("invalid recipient address: {}", peer))?;
            cmd_chat(local, peer, &cli.key).await
        }
    }
}

async fn cmd_demo(alice_addr: PeerAddress, key: &str) -> Result<()> {
    print_banner();
    print_demo_mode();

    let bob_addr = PeerAddress::parse(DEFAULT_PARTNER).context("default partner address")?;
    let chain = MockChain::new();
    let codec = XorCodec::new(key);

    // Pre-session history, recovered by backfill
    chain.seed(&bob_addr, &alice_addr, &codec.encrypt("You around?"), 1);
    chain.seed(&alice_addr, &bob_addr, &codec.encrypt("Yes, just got on."), 2);
    chain.seed(&bob_addr, &alice_addr, &codec.encrypt("Great, talk soon."), 3);

    let alice = session(&chain, alice_addr.clone(), key);
    let bob = session(&chain, bob_addr.clone(), key);

    let report = alice.bootstrap().await?;
    print_success(&format!("Backfilled {} historical messages", report.inserted));
    print_history(
        &alice.store().snapshot(&bob_addr)?,
        &bob_addr,
        &alice_addr,
    );

    alice.subscribe();
    bob.subscribe();

    print_info("Live conversation:");
    let script = [
        (true, "Hey Bob! The new sync engine is up."),
        (false, "Nice. Did the old history come through?"),
        (true, "All of it, deduplicated against the live feed."),
        (false, "Sending you the diagram: architecture.png"),
        (true, "Got it, looks right to me."),
    ];

    let mut first_live_id = None;
    for (from_alice, text) in script {
        let id = if from_alice {
            alice.send(&bob_addr, text).await?
        } else {
            bob.send(&alice_addr, text).await?
        };
        first_live_id.get_or_insert(id);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    print_history(
        &alice.store().snapshot(&bob_addr)?,
        &bob_addr,
        &alice_addr,
    );

    print_info("Unread on Bob's side before acknowledging:");
    print_unread(&bob.store().unread_peers()?);
    let receipts = bob.mark_read(&alice_addr).await?;
    print_success(&format!("Bob acknowledged {} messages", receipts.acknowledged));
    tokio::time::sleep(Duration::from_millis(100)).await;
    print_unread(&bob.store().unread_peers()?);

    if let Some(id) = first_live_id {
        print_info("Alice retracts her first live message:");
        chain.client(alice_addr.clone()).delete(id).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        print_history(&bob.store().snapshot(&alice_addr)?, &alice_addr, &bob_addr);
    }

    print_success("Demo complete!");
    Ok(())
}

async fn cmd_chat(local_addr: PeerAddress, peer_addr: PeerAddress, key: &str) -> Result<()> {
    print_banner();
    print_info(&format!(
        "Chatting as {} with simulated partner {}",
        local_addr.truncate(),
        peer_addr.truncate()
    ));
    print_interactive_help();

    let chain = MockChain::new();
    let me = session(&chain, local_addr.clone(), key);
    let partner = session(&chain, peer_addr.clone(), key);
    me.subscribe();
    partner.subscribe();

    // Simulated partner: acknowledges and echoes whatever arrives
    {
        let partner = Arc::clone(&partner);
        let local_addr = local_addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let Ok(unread) = partner.store().unread_inbound(&local_addr) else {
                    continue;
                };
                if unread.is_empty() {
                    continue;
                }
                if let Err(e) = partner.mark_read(&local_addr).await {
                    warn!(error = %e, "Simulated partner failed to acknowledge");
                }
                let reply = partner
                    .store()
                    .snapshot(&local_addr)
                    .ok()
                    .and_then(|snap| {
                        snap.iter()
                            .rev()
                            .find(|m| m.sender == local_addr)
                            .and_then(|m| m.body.as_text().map(String::from))
                    })
                    .map(|text| format!("echo: {}", text))
                    .unwrap_or_else(|| "echo".to_string());
                if let Err(e) = partner.send(&local_addr, &reply).await {
                    warn!(error = %e, "Simulated partner failed to reply");
                }
            }
        });
    }

    // Print inbound messages as they arrive
    {
        let me = Arc::clone(&me);
        let peer_addr = peer_addr.clone();
        let local_addr = local_addr.clone();
        tokio::spawn(async move {
            let mut printed = 0usize;
            loop {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let Ok(snap) = me.store().snapshot(&peer_addr) else {
                    continue;
                };
                let inbound: Vec<_> = snap
                    .iter()
                    .filter(|m| m.sender == peer_addr)
                    .cloned()
                    .collect();
                for message in inbound.iter().skip(printed) {
                    println!();
                    print_message(message, &local_addr);
                }
                printed = inbound.len();
            }
        });
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print_prompt(&peer_addr);
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input).is_err() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                me.unsubscribe();
                print_info("Goodbye!");
                break;
            }
            "/help" | "/?" => print_interactive_help(),
            "/history" => {
                print_history(&me.store().snapshot(&peer_addr)?, &peer_addr, &local_addr);
            }
            "/unread" => print_unread(&me.store().unread_peers()?),
            "/read" => {
                let report = me.mark_read(&peer_addr).await?;
                print_success(&format!("Acknowledged {} messages", report.acknowledged));
                if !report.failed.is_empty() {
                    print_error(&format!("{} receipts failed", report.failed.len()));
                }
            }
            "/export" => {
                let snap = me.store().snapshot(&peer_addr)?;
                println!("{}", serde_json::to_string_pretty(&snap)?);
            }
            text => match me.send(&peer_addr, text).await {
                Ok(_) => {
                    if let Some(message) = me
                        .store()
                        .snapshot(&peer_addr)?
                        .iter()
                        .rev()
                        .find(|m| m.sender == local_addr)
                    {
                        print_message(message, &local_addr);
                    }
                }
                Err(e) => print_error(&format!("Send failed: {}", e)),
            },
        }
    }

    Ok(())
}
