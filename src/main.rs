//! Stdio transport for the Orgdesk control gateway.
//!
//! The embedding shell spawns this process and speaks newline-delimited JSON:
//! one inbound frame per line on stdin, one outbound frame per line on
//! stdout. Diagnostics go to stderr so they never corrupt the frame stream.
//!
//! The surface identity for this connection is fixed at spawn time from the
//! first argument; frames cannot impersonate another surface.

use anyhow::Context;
use orgdesk::channel::{Direction, is_permitted};
use orgdesk::client::HttpOrgClient;
use orgdesk::gateway::{ControlGateway, FindCommand, InboundMessage, OutboundMessage};
use orgdesk::log_store::LogStore;
use orgdesk::prefs;
use orgdesk::session::SessionRegistry;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let surface = std::env::args().nth(1).unwrap_or_else(|| "main".to_string());
    tracing::info!(%surface, "gateway starting");

    let registry = Arc::new(SessionRegistry::new());
    let log = Arc::new(LogStore::new());
    let client = Arc::new(HttpOrgClient::new());
    let preferences = prefs::load_preferences();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (find_tx, mut find_rx) = mpsc::unbounded_channel::<FindCommand>();

    let gateway = Arc::new(ControlGateway::new(
        registry,
        log,
        client,
        preferences,
        out_tx,
        find_tx,
    ));

    // Outbound frames, one JSON object per line.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = out_rx.recv().await {
            let mut line = match serde_json::to_vec(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "dropping unserializable frame");
                    continue;
                }
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // Find directives are handed to the shell's page-search API. Without an
    // embedder attached there is nothing to drive, so just trace them.
    tokio::spawn(async move {
        while let Some(command) = find_rx.recv().await {
            tracing::debug!(
                surface = %command.surface,
                text = %command.directive.text,
                find_next = command.directive.find_next,
                "find directive"
            );
        }
    });

    // Each frame is dispatched as its own task on this thread, so a request
    // parked in a remote call never stalls the frames behind it. The
    // LocalSet keeps dispatch cooperative and single-threaded; the per-org
    // locks in the registry guard the awaited sequences.
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut lines = stdin.lines();
            while let Some(line) = lines.next_line().await.context("reading stdin")? {
                if line.trim().is_empty() {
                    continue;
                }
                let message: InboundMessage = match serde_json::from_str(&line) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding unparseable frame");
                        continue;
                    }
                };
                // The transport-level allow-list. Anything outside it
                // vanishes here; the sender gets no reply and no log entry
                // to probe against.
                if !is_permitted(Direction::Inbound, &message.kind) {
                    continue;
                }
                let gateway = gateway.clone();
                let surface = surface.clone();
                tokio::task::spawn_local(async move {
                    gateway.handle(&surface, message).await;
                });
            }
            anyhow::Ok(())
        })
        .await?;

    tracing::info!("stdin closed, draining in-flight requests");
    drop(gateway);
    local.await;
    writer.await.ok();
    Ok(())
}
