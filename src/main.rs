//! Reads WebSocket frames (one JSON object per line) from stdin and prints the
//! normalized messages as JSON lines on stdout.
//!
//! The directory starts empty and learns authors and channels from the frames
//! themselves, so a captured event stream can be replayed offline.

use std::sync::Arc;

use anyhow::{Context, Result};
use mattermost_relay::config::RelayConfig;
use mattermost_relay::dedup::DedupCache;
use mattermost_relay::directory::{Directory, IdentityResolver, InMemoryDirectory};
use mattermost_relay::events::{EventNormalizer, RawEvent, parse_frame};
use mattermost_relay::relay::Relay;
use mattermost_relay::types::{Channel, Post, User};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mattermost_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = RelayConfig::from_env().context("loading configuration")?;
    info!(server = %config.server, dedup_capacity = config.dedup_capacity, "Starting relay");

    let directory = Arc::new(InMemoryDirectory::new());
    let normalizer = EventNormalizer::new(
        IdentityResolver::new(directory.clone()),
        Arc::new(DedupCache::new(config.dedup_capacity)),
    );

    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (message_tx, mut message_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let relay = tokio::spawn(Relay::new(normalizer).run(
        event_rx,
        message_tx,
        CancellationToken::new(),
    ));

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = message_rx.recv().await {
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
        }
        stdout.flush().await?;
        Ok::<_, anyhow::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_frame(line.as_bytes()) {
            Ok(Some(event)) => {
                learn(&directory, &event);
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Skipping malformed frame"),
        }
    }
    drop(event_tx);

    let (stats, reason) = relay.await.context("relay task failed")?;
    printer.await.context("output task failed")??;
    info!(?stats, ?reason, "Relay finished");
    Ok(())
}

/// Records the author and channel a frame describes, if not already known.
fn learn(directory: &InMemoryDirectory, event: &RawEvent) {
    match event {
        RawEvent::UserUpdated(e) => directory.insert_user(e.user.clone()),
        RawEvent::Post(e) => {
            let Ok(post) = Post::decode(&e.post) else {
                return;
            };
            if !e.sender_name.is_empty()
                && !post.user_id.is_empty()
                && directory.user(&post.user_id).is_none()
            {
                let username = e.sender_name.trim_start_matches('@');
                directory.insert_user(User::new(post.user_id.clone(), username));
            }
            if !e.channel_name.is_empty()
                && !post.channel_id.is_empty()
                && directory.channel_name(&post.channel_id).is_empty()
            {
                directory.insert_channel(Channel {
                    id: post.channel_id,
                    team_id: e.team_id.clone(),
                    name: e.channel_name.clone(),
                    display_name: e.channel_display_name.clone(),
                    ..Channel::default()
                });
            }
        }
        _ => {}
    }
}
