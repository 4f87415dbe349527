//! End-to-end destructor tracking against the in-process host.

use bridge_local::LocalHost;
use bridge_traits::{InitEvent, LifecycleChannel, LifecycleHooks, LifecycleId};
use core_lifecycle::{
    track_destructors, CompletionState, DestructorTracker, TrackerError, IGNORED_TYPES,
};
use core_runtime::config::TrackerConfig;
use core_runtime::events::TrackerEvent;
use core_runtime::logging::init_test_logging;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(2);
const SHORT_WAIT: Duration = Duration::from_millis(50);

fn start(host: &LocalHost) -> DestructorTracker {
    init_test_logging();
    track_destructors(Arc::new(host.clone())).unwrap()
}

#[tokio::test]
async fn test_dropped_resource_is_reported_destroyed() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let source = host.allocate("RTCVideoSource", ());
    let weak = Arc::downgrade(&source);
    let destroyed = tracker.destructor(&source);
    drop(source);

    assert_eq!(timeout(WAIT, destroyed).await.unwrap(), Ok(()));
    assert!(weak.upgrade().is_none());
    assert_eq!(host.live_count(), 0);
    assert!(tracker.pending_ids().is_empty());

    tracker.stop();
}

#[tokio::test]
async fn test_only_destroyed_resource_settles() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let resources: Vec<_> = (0..3).map(|_| host.allocate("MediaStreamTrack", ())).collect();
    let completions: Vec<_> = resources.iter().map(|r| tracker.destructor(r)).collect();
    let ids = tracker.pending_ids();
    assert_eq!(ids.len(), 3);

    host.emit_destroy(ids[1]);

    assert_eq!(completions[0].state(), CompletionState::Pending);
    assert_eq!(completions[1].state(), CompletionState::Resolved);
    assert_eq!(completions[2].state(), CompletionState::Pending);

    assert!(tracker.destructor(&resources[0]).is_pending());
    assert!(tracker.destructor(&resources[2]).is_pending());
    assert_eq!(
        tracker.destructor(&resources[1]).await,
        Err(TrackerError::IdNotPending(ids[1]))
    );

    tracker.stop();
}

#[tokio::test]
async fn test_ignored_type_fails_immediately() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let timer = host.allocate("Timeout", ());
    let outcome = timeout(SHORT_WAIT, tracker.destructor(&timer)).await;

    assert_eq!(outcome.unwrap(), Err(TrackerError::ResourceNotTracked));
    assert!(tracker.pending_ids().is_empty());

    tracker.stop();
}

#[tokio::test]
async fn test_stop_leaves_signal_unresolved() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let connection = host.allocate("RTCPeerConnection", ());
    let destroyed = tracker.destructor(&connection);
    tracker.stop();

    drop(connection);
    assert_eq!(host.gc(), 1);

    assert!(timeout(SHORT_WAIT, destroyed.clone()).await.is_err());
    assert!(destroyed.is_pending());
    assert_eq!(tracker.pending_count(), 1);
}

#[tokio::test]
async fn test_signal_settles_at_most_once() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let track = host.allocate("MediaStreamTrack", ());
    let destroyed = tracker.destructor(&track);
    let id = tracker.pending_ids()[0];

    host.emit_destroy(id);
    host.emit_destroy(id);

    assert_eq!(destroyed.state(), CompletionState::Resolved);
    assert_eq!(destroyed.clone().await, Ok(()));
    assert_eq!(destroyed.await, Ok(()));

    tracker.stop();
}

#[tokio::test]
async fn test_ignored_types_never_tracked_under_churn() {
    let host = LocalHost::new();
    let tracker = start(&host);
    let mut events = tracker.subscribe_events().unwrap();

    let mut kept_ignored = Vec::new();
    let mut kept_tracked = Vec::new();
    for round in 0..20u32 {
        for type_name in IGNORED_TYPES {
            let resource = host.allocate(type_name, round);
            if round % 2 == 0 {
                kept_ignored.push(resource);
            }
        }
        let tracked = host.allocate("RTCAudioSource", round);
        if round % 5 == 0 {
            kept_tracked.push(tracked);
        } else {
            drop(tracked);
        }
        host.gc();
        tokio::task::yield_now().await;
    }

    assert_eq!(tracker.pending_count(), kept_tracked.len());
    for resource in &kept_ignored {
        assert_eq!(
            tracker.try_destructor(resource).unwrap_err(),
            TrackerError::ResourceNotTracked
        );
    }
    for resource in &kept_tracked {
        assert!(tracker.destructor(resource).is_pending());
    }

    // The bus may lag under this volume; only delivered events are checked.
    while let Some(event) = events.try_recv() {
        if let Ok(TrackerEvent::ResourceTracked { type_name, .. }) = event {
            assert_eq!(type_name, "RTCAudioSource");
        }
    }

    tracker.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_churn_resolves_every_tracked_resource() {
    init_test_logging();
    let host = LocalHost::new();
    let config = TrackerConfig::builder()
        .collection_interval(Duration::from_millis(1))
        .event_buffer_size(1 << 16)
        .build()
        .unwrap();
    let tracker = DestructorTracker::new(Arc::new(host.clone()), config).unwrap();
    let mut events = tracker.subscribe_events().unwrap();
    tracker.start().unwrap();

    const THREADS: usize = 4;
    const ROUNDS: usize = 50;

    let (completions, kept_ignored) = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let host = &host;
                let tracker = &tracker;
                scope.spawn(move || {
                    let mut completions = Vec::new();
                    let mut kept = Vec::new();
                    for round in 0..ROUNDS {
                        for type_name in IGNORED_TYPES {
                            let resource = host.allocate(type_name, (worker, round));
                            if round % 10 == 0 {
                                kept.push(resource);
                            }
                        }
                        let source = host.allocate("RTCAudioSource", (worker, round));
                        completions.push(tracker.destructor(&source));
                        drop(source);
                        if round % 3 == 0 {
                            host.gc();
                        }
                    }
                    (completions, kept)
                })
            })
            .collect();

        let mut completions = Vec::new();
        let mut kept_ignored = Vec::new();
        for worker in workers {
            let (c, k) = worker.join().unwrap();
            completions.extend(c);
            kept_ignored.extend(k);
        }
        (completions, kept_ignored)
    });

    assert_eq!(completions.len(), THREADS * ROUNDS);
    for completion in completions {
        assert_eq!(timeout(WAIT, completion).await.unwrap(), Ok(()));
    }
    assert_eq!(tracker.pending_count(), 0);

    for resource in &kept_ignored {
        assert_eq!(
            tracker.try_destructor(resource).unwrap_err(),
            TrackerError::ResourceNotTracked
        );
    }

    let mut tracked = 0;
    while let Some(event) = events.try_recv() {
        if let TrackerEvent::ResourceTracked { type_name, .. } = event.unwrap() {
            assert_eq!(type_name, "RTCAudioSource");
            tracked += 1;
        }
    }
    assert_eq!(tracked, THREADS * ROUNDS);

    tracker.stop();
}

/// Announces each destruction it sees, then holds the delivering thread.
struct SlowHooks {
    entered: Mutex<mpsc::Sender<LifecycleId>>,
}

impl LifecycleHooks for SlowHooks {
    fn init(&self, _event: InitEvent<'_>) {}

    fn destroy(&self, id: LifecycleId) {
        let _ = self
            .entered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send(id);
        thread::sleep(Duration::from_millis(100));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nothing_settles_after_stop_returns() {
    init_test_logging();
    let host = LocalHost::new();
    let (entered_tx, entered_rx) = mpsc::channel();
    host.enable(Arc::new(SlowHooks {
        entered: Mutex::new(entered_tx),
    }))
    .unwrap();

    let config = TrackerConfig::builder()
        .collection_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    let tracker = DestructorTracker::new(Arc::new(host.clone()), config).unwrap();
    tracker.start().unwrap();
    // Let the pump's first tick pass before anything becomes collectable.
    sleep(Duration::from_millis(20)).await;

    let source = host.allocate("RTCVideoSource", ());
    let destroyed = tracker.destructor(&source);
    drop(source);

    let collector = {
        let host = host.clone();
        thread::spawn(move || host.gc())
    };

    entered_rx.recv_timeout(WAIT).unwrap();
    tracker.stop();
    assert!(destroyed.is_pending());

    assert_eq!(collector.join().unwrap(), 1);
    assert!(timeout(SHORT_WAIT, destroyed.clone()).await.is_err());
    assert!(destroyed.is_pending());
    assert_eq!(tracker.pending_count(), 1);
}

#[tokio::test]
async fn test_tracking_does_not_extend_lifetime() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let source = host.allocate("RTCVideoSource", vec![0u8; 1024]);
    let weak = Arc::downgrade(&source);

    tracker.wait_for_destruction(source, WAIT).await.unwrap();
    assert!(weak.upgrade().is_none());

    tracker.stop();
}

#[tokio::test]
async fn test_live_resource_times_out() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let source = host.allocate("RTCVideoSource", ());
    let extra = source.clone();

    assert_eq!(
        tracker.wait_for_destruction(source, SHORT_WAIT).await,
        Err(TrackerError::Timeout(SHORT_WAIT))
    );

    drop(extra);
    tracker.stop();
}

#[tokio::test]
async fn test_unknown_object_fails_immediately() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let stranger = Arc::new(String::from("not from the host"));
    let outcome = timeout(SHORT_WAIT, tracker.destructor(&stranger)).await;
    assert_eq!(outcome.unwrap(), Err(TrackerError::ResourceNotTracked));

    assert!(matches!(
        tracker.try_destructor(&stranger),
        Err(TrackerError::ResourceNotTracked)
    ));

    tracker.stop();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let host = LocalHost::new();
    let tracker = start(&host);
    assert_eq!(host.subscriber_count(), 1);

    tracker.stop();
    tracker.stop();
    tracker.stop();

    assert_eq!(host.subscriber_count(), 0);
    assert!(!tracker.is_running());
}

#[tokio::test]
async fn test_stop_halts_collection() {
    let host = LocalHost::new();
    let tracker = start(&host);

    sleep(Duration::from_millis(20)).await;
    assert!(host.collections() > 0);

    tracker.stop();
    sleep(Duration::from_millis(10)).await;
    let collections = host.collections();

    sleep(Duration::from_millis(30)).await;
    assert_eq!(host.collections(), collections);
}

#[tokio::test]
async fn test_missing_collector_is_fatal_at_startup() {
    init_test_logging();
    let host = LocalHost::without_collector();

    let err = track_destructors(Arc::new(host.clone())).unwrap_err();

    assert!(matches!(
        err,
        TrackerError::Runtime(core_runtime::Error::CapabilityMissing { ref capability, .. })
            if capability == "GarbageCollector"
    ));
    assert_eq!(host.subscriber_count(), 0);
}

#[tokio::test]
async fn test_destroy_of_unknown_id_is_ignored() {
    let host = LocalHost::new();
    let tracker = start(&host);

    let track = host.allocate("MediaStreamTrack", ());
    let timer = host.allocate("Timeout", ());
    let before = tracker.pending_ids();

    host.emit_destroy(LifecycleId::new(9_999));
    host.emit_destroy(LifecycleId::ROOT);

    assert_eq!(tracker.pending_ids(), before);
    assert!(tracker.destructor(&track).is_pending());

    drop(timer);
    tracker.stop();
}

#[tokio::test]
async fn test_restart_after_stop() {
    let host = LocalHost::new();
    let tracker = start(&host);

    assert_eq!(tracker.start(), Err(TrackerError::AlreadyRunning));

    tracker.stop();
    tracker.start().unwrap();
    assert!(tracker.is_running());
    assert_eq!(host.subscriber_count(), 1);

    let sink = host.allocate("RTCVideoSink", ());
    tracker.wait_for_destruction(sink, WAIT).await.unwrap();

    tracker.stop();
}

#[tokio::test]
async fn test_drop_unsubscribes() {
    let host = LocalHost::new();
    let tracker = start(&host);
    assert_eq!(host.subscriber_count(), 1);

    drop(tracker);
    assert_eq!(host.subscriber_count(), 0);
}

#[tokio::test]
async fn test_additional_ignored_types() {
    init_test_logging();
    let host = LocalHost::new();
    let config = TrackerConfig::builder()
        .ignore_type("FILEHANDLE")
        .collection_interval(Duration::from_millis(5))
        .build()
        .unwrap();
    let tracker = DestructorTracker::new(Arc::new(host.clone()), config).unwrap();
    tracker.start().unwrap();

    let handle = host.allocate("FILEHANDLE", ());
    assert_eq!(
        tracker.try_destructor(&handle).unwrap_err(),
        TrackerError::ResourceNotTracked
    );

    tracker.stop();
}

#[tokio::test]
async fn test_event_sequence() {
    let host = LocalHost::new();
    init_test_logging();
    let tracker = DestructorTracker::new(Arc::new(host.clone()), TrackerConfig::default()).unwrap();
    let mut events = tracker.subscribe_events().unwrap();

    tracker.start().unwrap();
    let parent = host.allocate("RTCPeerConnection", ());
    let parent_id = tracker.pending_ids()[0];
    let child = host.allocate_from(parent_id, "RTCDataChannel", ());
    let _timer = host.allocate("Timeout", ());

    assert!(matches!(
        events.recv().await.unwrap(),
        TrackerEvent::TrackerStarted { collection_interval_ms: 1 }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        TrackerEvent::ResourceTracked { id, .. } if id == parent_id
    ));
    match events.recv().await.unwrap() {
        TrackerEvent::ResourceTracked {
            type_name,
            trigger_id,
            ..
        } => {
            assert_eq!(type_name, "RTCDataChannel");
            assert_eq!(trigger_id, parent_id);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        TrackerEvent::ResourceIgnored { ref type_name, .. } if type_name == "Timeout"
    ));

    drop(child);
    drop(parent);
    let mut destroyed = events.filter(|event| matches!(event, TrackerEvent::ResourceDestroyed { .. }));
    timeout(WAIT, destroyed.recv()).await.unwrap().unwrap();
    timeout(WAIT, destroyed.recv()).await.unwrap().unwrap();

    tracker.stop();
}

#[tokio::test]
async fn test_stop_event_reports_pending() {
    let host = LocalHost::new();
    let tracker = start(&host);
    let mut stopped = tracker
        .subscribe_events()
        .unwrap()
        .filter(|event| matches!(event, TrackerEvent::TrackerStopped { .. }));

    let _track = host.allocate("MediaStreamTrack", ());
    tracker.stop();

    assert_eq!(
        stopped.recv().await.unwrap(),
        TrackerEvent::TrackerStopped { pending: 1 }
    );
}

#[test]
fn test_start_outside_runtime() {
    let host = LocalHost::new();
    let err = track_destructors(Arc::new(host.clone())).unwrap_err();

    assert!(matches!(err, TrackerError::RuntimeUnavailable(_)));
    assert_eq!(host.subscriber_count(), 0);
}
