use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smithrun_langsmith::{
    FlushError, LangSmithConfig, LangSmithError, LangSmithExporter, RunContextStore, RunEvent,
    RunType, TelemetrySink,
};

#[derive(Default)]
struct MemorySink {
    delay: Duration,
    fail: bool,
    received: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    fn names(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                RunEvent::Start { name, .. } => Some(name.clone()),
                RunEvent::Update { .. } => None,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn submit(&self, event: &RunEvent) -> Result<(), LangSmithError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(LangSmithError::Http {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "sink down".to_string(),
            });
        }
        self.received.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn config(flush_interval: Duration, max_batch_size: usize, queue_capacity: usize) -> LangSmithConfig {
    let mut config = LangSmithConfig::new(SecretString::new("key".to_string()), "test");
    config.flush_interval = flush_interval;
    config.max_batch_size = max_batch_size;
    config.queue_capacity = queue_capacity;
    config
}

fn start(name: &str) -> RunEvent {
    let run_id = Uuid::new_v4();
    RunEvent::Start {
        run_id,
        parent_run_id: None,
        trace_id: run_id,
        name: name.to_string(),
        run_type: RunType::Chain,
        start_time: Utc::now(),
        inputs: json!({}),
        tags: vec![],
        metadata: json!({}),
        session_name: "test".to_string(),
        reference_example_id: None,
    }
}

#[tokio::test]
async fn drops_oldest_when_queue_full() {
    let sink = Arc::new(MemorySink::default());
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 10, 1),
        sink.clone(),
        Arc::new(RunContextStore::default()),
    );

    exporter.enqueue(start("a")).await;
    exporter.enqueue(start("b")).await;
    assert_eq!(exporter.dropped_events(), 1);

    let stats = exporter.flush(Duration::from_secs(2)).await.unwrap();
    assert_eq!(stats.dropped_events, 1);
    assert_eq!(sink.names(), vec!["b"]);
}

#[tokio::test]
async fn flush_drains_queue_in_batches() {
    let sink = Arc::new(MemorySink::default());
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 2, 10),
        sink.clone(),
        Arc::new(RunContextStore::default()),
    );

    for name in ["a", "b", "c"] {
        exporter.enqueue(start(name)).await;
    }
    let stats = exporter.flush(Duration::from_secs(2)).await.unwrap();

    assert_eq!(stats.events_flushed, 3);
    assert_eq!(stats.batches_sent, 2);
    assert_eq!(sink.names(), vec!["a", "b", "c"]);
    assert_eq!(exporter.pending_len().await, 0);
}

#[tokio::test]
async fn flush_waits_for_batches_already_in_flight() {
    let sink = Arc::new(MemorySink {
        delay: Duration::from_millis(15),
        ..Default::default()
    });
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_millis(10), 3, 100),
        sink.clone(),
        Arc::new(RunContextStore::default()),
    );

    for index in 0..12 {
        exporter.enqueue(start(&format!("run-{index}"))).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    exporter.flush(Duration::from_secs(5)).await.unwrap();

    assert_eq!(sink.len(), 12);
    assert_eq!(exporter.pending_len().await, 0);
}

#[tokio::test]
async fn failed_submissions_are_counted_not_raised() {
    let sink = Arc::new(MemorySink {
        fail: true,
        ..Default::default()
    });
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 10, 10),
        sink,
        Arc::new(RunContextStore::default()),
    );

    exporter.enqueue(start("a")).await;
    exporter.enqueue(start("b")).await;
    let stats = exporter.flush(Duration::from_secs(2)).await.unwrap();

    assert_eq!(stats.events_failed, 2);
    assert_eq!(stats.events_flushed, 0);
    assert_eq!(exporter.failed_events(), 2);
    assert_eq!(exporter.pending_len().await, 0);
}

#[tokio::test]
async fn flush_times_out_with_pending_events() {
    let sink = Arc::new(MemorySink {
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 1, 10),
        sink,
        Arc::new(RunContextStore::default()),
    );

    for name in ["a", "b", "c", "d", "e"] {
        exporter.enqueue(start(name)).await;
    }
    match exporter.flush(Duration::from_millis(50)).await {
        Err(FlushError::Timeout { pending, .. }) => assert!(pending >= 1),
        Ok(stats) => panic!("expected timeout, flushed {}", stats.events_flushed),
    }
}

#[tokio::test]
async fn flush_deadline_holds_when_sink_never_answers() {
    let sink = Arc::new(MemorySink {
        delay: Duration::from_secs(3600),
        ..Default::default()
    });
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 10, 10),
        sink,
        Arc::new(RunContextStore::default()),
    );
    exporter.enqueue(start("a")).await;
    exporter.enqueue(start("b")).await;

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        exporter.flush(Duration::from_millis(100)),
    )
    .await
    .expect("flush overran its own timeout");

    match result {
        Err(FlushError::Timeout { waited, pending }) => {
            assert!(waited < Duration::from_secs(1));
            assert_eq!(pending, 2);
        }
        Ok(stats) => panic!("expected timeout, flushed {}", stats.events_flushed),
    }
}

fn update(run_id: Uuid, error: Option<&str>) -> RunEvent {
    RunEvent::Update {
        run_id,
        end_time: Some(Utc::now()),
        outputs: None,
        error: error.map(str::to_string),
        duration_ms: Some(1),
    }
}

#[tokio::test]
async fn finished_runs_leave_the_run_store() {
    let sink = Arc::new(MemorySink::default());
    let store = Arc::new(RunContextStore::default());
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 50, 1000),
        sink.clone(),
        store.clone(),
    );

    for index in 0..200 {
        let event = start(&format!("run-{index}"));
        let run_id = event.run_id();
        exporter.enqueue(event).await;
        exporter.enqueue(update(run_id, None)).await;
    }
    let open = start("still-running");
    let open_id = open.run_id();
    exporter.enqueue(open).await;
    exporter.flush(Duration::from_secs(5)).await.unwrap();

    assert_eq!(sink.len(), 401);
    assert_eq!(store.len(), 1);
    assert!(store.status(open_id).is_some());
}

#[tokio::test]
async fn update_after_failure_keeps_first_error() {
    let sink = Arc::new(MemorySink::default());
    let store = Arc::new(RunContextStore::default());
    let exporter = LangSmithExporter::with_sink(
        config(Duration::from_secs(3600), 10, 10),
        sink.clone(),
        store.clone(),
    );
    let run_id = Uuid::new_v4();
    for error in [Some("first".to_string()), None] {
        exporter
            .enqueue(RunEvent::Update {
                run_id,
                end_time: None,
                outputs: None,
                error,
                duration_ms: None,
            })
            .await;
    }
    exporter.flush(Duration::from_secs(2)).await.unwrap();

    let errors: Vec<Option<String>> = sink
        .received
        .lock()
        .unwrap()
        .iter()
        .map(|event| match event {
            RunEvent::Update { error, .. } => error.clone(),
            RunEvent::Start { .. } => None,
        })
        .collect();
    assert_eq!(errors, vec![Some("first".to_string()), Some("first".to_string())]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn default_sink_posts_to_langsmith() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config(Duration::from_secs(3600), 10, 10);
    config.api_url = server.uri();
    let exporter = LangSmithExporter::new(config, Arc::new(RunContextStore::default()));
    exporter.enqueue(start("a")).await;
    exporter.enqueue(start("b")).await;

    let stats = exporter.shutdown(Duration::from_secs(2)).await.unwrap();
    assert_eq!(stats.events_flushed, 2);
}
