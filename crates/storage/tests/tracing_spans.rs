//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on `MemoryBackend` operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use keyrecord_storage::{MemoryBackend, StorageBackend};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer — records span names as they are created
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

async fn recorded_spans<F, Fut>(op: F) -> Vec<String>
where
    F: FnOnce(MemoryBackend) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    op(MemoryBackend::new()).await;

    spans.lock().expect("lock poisoned").clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_backend_set_creates_span() {
    let recorded = recorded_spans(|backend| async move {
        backend.set(b"key-1".to_vec(), b"value-1".to_vec()).await.expect("set should succeed");
    })
    .await;
    assert!(recorded.iter().any(|s| s == "set"), "expected a 'set' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_backend_get_creates_span() {
    let recorded = recorded_spans(|backend| async move {
        let _ = backend.get(b"missing").await;
    })
    .await;
    assert!(recorded.iter().any(|s| s == "get"), "expected a 'get' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_backend_keys_matching_creates_span() {
    let recorded = recorded_spans(|backend| async move {
        backend.keys_matching("w:*").await.expect("scan should succeed");
    })
    .await;
    assert!(
        recorded.iter().any(|s| s == "keys_matching"),
        "expected a 'keys_matching' span, got: {recorded:?}"
    );
}

#[tokio::test]
async fn memory_backend_delete_many_creates_span() {
    let recorded = recorded_spans(|backend| async move {
        backend.delete_many(&[b"a".to_vec()]).await.expect("delete_many should succeed");
    })
    .await;
    assert!(
        recorded.iter().any(|s| s == "delete_many"),
        "expected a 'delete_many' span, got: {recorded:?}"
    );
}
