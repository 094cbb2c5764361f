//! Request correlation benchmark suite.
//!
//! Measures the in-process cost of one request/response cycle:
//! - Correlator alone (register, send, match, resolve)
//! - Serializer queue at different depths
//!
//! The agent is a loopback task answering every request immediately, so
//! the numbers exclude sockets.
//!
//! Run with: cargo bench --bench correlator
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::future::join_all;
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use browser_bridge::{ActionSerializer, Error, Frame, RequestCorrelator, Result, Transport};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const QUEUE_DEPTHS: &[usize] = &[1, 10, 100];

// ============================================================================
// Loopback Agent
// ============================================================================

/// Hands every outgoing frame to the loopback task.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl Transport for LoopbackTransport {
    fn send_text(&self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {}
}

/// Builds a correlator whose requests are completed by a background task.
fn loopback(rt: &Runtime) -> Arc<RequestCorrelator> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let correlator = Arc::new(RequestCorrelator::new(
        Arc::new(LoopbackTransport { tx }),
        REQUEST_TIMEOUT,
    ));

    let agent_side = Arc::clone(&correlator);
    rt.spawn(async move {
        while let Some(text) = rx.recv().await {
            let Ok(request) = Frame::from_json(&text) else {
                continue;
            };
            let reply = Frame::completion(request.id, &request.frame_type, json!({ "ok": true }));
            if let Ok(reply) = reply.to_json() {
                agent_side.handle_incoming(&reply);
            }
        }
    });

    correlator
}

// ============================================================================
// Benchmark: Single Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let correlator = loopback(&rt);

    c.bench_function("correlator_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            correlator
                .send("browser_click", json!({ "ref": "s1e2" }))
                .await
                .expect("round trip")
        });
    });
}

// ============================================================================
// Benchmark: Serialized Queue
// ============================================================================

fn bench_serializer_queue(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let serializer = ActionSerializer::new(loopback(&rt));

    let mut group = c.benchmark_group("serializer_queue");

    for &depth in QUEUE_DEPTHS {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            b.to_async(&rt).iter(|| async {
                let pending: Vec<_> = (0..depth)
                    .map(|i| serializer.enqueue("browser_wait", json!({ "time": i })))
                    .collect();
                for result in join_all(pending).await {
                    result.expect("queued round trip");
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_serializer_queue);
criterion_main!(benches);
