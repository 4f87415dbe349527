//! Destructor tracking demonstration
//!
//! Allocates a few resources on the in-process host, releases some of them
//! and shows which destructor signals settle.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run -p core-lifecycle --example destructor_demo
//!
//! # JSON format
//! cargo run -p core-lifecycle --example destructor_demo -- json
//! ```

use bridge_local::LocalHost;
use core_lifecycle::{CompletionState, DestructorTracker};
use core_runtime::config::TrackerConfig;
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let format = match env::args().nth(1).as_deref() {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(LogLevel::Debug),
    )
    .expect("Failed to initialize logging");

    let host = LocalHost::new();
    let config = TrackerConfig::builder()
        .collection_interval(Duration::from_millis(10))
        .build()
        .expect("valid config");
    let tracker = DestructorTracker::new(Arc::new(host.clone()), config)
        .expect("Failed to create tracker");
    tracker.start().expect("Failed to start tracker");

    let connection = host.allocate("RTCPeerConnection", ());
    let audio = host.allocate("MediaStreamTrack", "audio");
    let video = host.allocate("MediaStreamTrack", "video");
    let timer = host.allocate("Timeout", ());

    info!(pending = ?tracker.pending_ids(), "Resources allocated");

    if let Err(err) = tracker.destructor(&timer).await {
        info!(error = %err, "Timers are not tracked");
    }

    let audio_destroyed = tracker.destructor(&audio);
    drop(audio);
    match tracker
        .wait_for_destruction(video, Duration::from_secs(1))
        .await
    {
        Ok(()) => info!("Video track released"),
        Err(err) => warn!(error = %err, "Video track leaked"),
    }

    let audio_released = audio_destroyed.state() == CompletionState::Resolved;
    info!(audio_released, "Audio track state");

    let leaked = tracker.destructor(&connection);
    tracker.stop();
    info!(
        still_pending = leaked.is_pending(),
        live = host.live_count(),
        "Stopped while the connection was still held"
    );
}
