//! Echo agent demonstration.
//!
//! Demonstrates:
//! - Implementing `ActionHandler` with typed `Action` parsing
//! - Connecting to the bridge server with automatic reconnect
//! - Watching reconnect state changes
//!
//! Usage:
//!   cargo run --example 002_echo_agent
//!   cargo run --example 002_echo_agent -- --debug
//!
//! Set `BROWSER_BRIDGE_URL` to dial a server other than `ws://localhost:8080`.

mod common;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::{Value, json};

use browser_bridge::{Action, ActionHandler, AgentClient, AgentConfig, Error, Result};
use common::Args;

// ============================================================================
// Handler
// ============================================================================

/// Pretends to drive a page and echoes what it was asked to do.
struct EchoHandler;

#[async_trait]
impl ActionHandler for EchoHandler {
    async fn handle(&self, action_type: &str, data: Value) -> Result<Value> {
        let action = Action::parse(action_type, data)
            .map_err(|_| Error::remote(format!("Unknown message type: {action_type}")))?;

        println!("    → {action:?}");

        let reply = match action {
            Action::Navigate { url } => json!({ "url": url }),
            Action::Click { reference, .. } => json!({ "clicked": reference }),
            Action::Type { reference, text, .. } => json!({ "typed": text, "ref": reference }),
            Action::Snapshot => json!("- document [ref=s1e1]\n  - textbox \"Search\" [ref=s1e3]"),
            other => json!({ "echo": other.wire_type() }),
        };

        Ok(reply)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== 002: Echo Agent ===\n");

    let config = AgentConfig::from_env()?.with_agent_name("echo-agent");
    println!("[Setup] Dialing {}...", config.url);

    let agent = AgentClient::new(config, EchoHandler).spawn()?;
    let mut state = agent.watch_state();

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("[State] {:?}", *state.borrow_and_update());
            }

            _ = tokio::signal::ctrl_c() => {
                println!("\n[Exit] Shutting down");
                break;
            }
        }
    }

    agent.shutdown().await;
    Ok(())
}
