//! Bridge server demonstration.
//!
//! Demonstrates:
//! - Starting the server on the agent's fixed port (reclaiming it if stale)
//! - Waiting for an agent to connect
//! - Sending typed actions one after another
//! - Remote errors and timeouts surfacing as `Error` values
//!
//! Usage:
//!   cargo run --example 001_bridge_server
//!   cargo run --example 001_bridge_server -- --no-wait
//!   cargo run --example 001_bridge_server -- --debug
//!
//! Pair it with `002_echo_agent` in another terminal.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use browser_bridge::{Action, BridgeConfig, BridgeServer, Result};

// ============================================================================
// Constants
// ============================================================================

const URL: &str = "https://example.com";

const AGENT_WAIT: Duration = Duration::from_secs(60);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Bridge Server ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Starting server...");
    let server = BridgeServer::start(BridgeConfig::from_env()?).await?;
    println!("        ✓ Listening on {}\n", server.ws_url());

    println!("[Setup] Waiting for agent (up to {}s)...", AGENT_WAIT.as_secs());
    server.wait_for_agent(AGENT_WAIT).await?;
    println!("        ✓ Agent connected\n");

    // ========================================================================
    // Navigate
    // ========================================================================

    println!("[1] Navigate to {URL}...");
    let result = server
        .execute(&Action::Navigate { url: URL.into() })
        .await?;
    println!("    ✓ {result}");

    // ========================================================================
    // Back-to-back actions
    // ========================================================================

    println!("\n[2] Click then type (sent strictly in order)...");
    let click_action = Action::Click {
        element: Some("Search box".into()),
        reference: "s1e3".into(),
    };
    let type_action = Action::Type {
        element: Some("Search box".into()),
        reference: "s1e3".into(),
        text: "hello".into(),
        submit: true,
    };
    let click = server.execute(&click_action);
    let typed = server.execute(&type_action);
    let (click, typed) = tokio::join!(click, typed);
    println!("    ✓ click: {}", click?);
    println!("    ✓ type:  {}", typed?);

    // ========================================================================
    // Remote error
    // ========================================================================

    println!("\n[3] Unsupported action...");
    match server.call("browser_fly", serde_json::json!({})).await {
        Ok(value) => println!("    ? unexpected success: {value}"),
        Err(e) => println!("    ✓ agent refused: {e}"),
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    println!("\n[4] Capture snapshot...");
    let snapshot = server.execute(&Action::Snapshot).await?;
    println!("    ✓ {snapshot}");

    println!("\n=== Done ===\n");
    common::wait_for_exit(args.no_wait).await;

    server.shutdown();
    Ok(())
}
