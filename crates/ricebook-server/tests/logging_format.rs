// SPDX-License-Identifier: Apache-2.0

//! Pins the audit log line format: one JSON object per event, queryable
//! by target and by the request fields the middleware attaches.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("buffer lock").clone()).expect("utf8 log output")
    }
}

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter(self.0.clone())
    }
}

#[test]
fn audit_events_render_as_single_json_objects() {
    let sink = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .json()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(
            target: "ricebook_audit",
            method = "GET",
            path = "/articles",
            status = 200u16,
            request_id = "req-42",
            client_ip = "local",
            latency_ms = 3u64,
            "audit"
        );
    });

    let output = sink.contents();
    let line = output.lines().next().expect("one audit line");
    let event: Value = serde_json::from_str(line).expect("audit line is json");

    assert_eq!(event.get("level").and_then(Value::as_str), Some("INFO"));
    assert_eq!(
        event.get("target").and_then(Value::as_str),
        Some("ricebook_audit")
    );
    let fields = event.get("fields").expect("fields object");
    assert_eq!(
        fields.get("message").and_then(Value::as_str),
        Some("audit")
    );
    assert_eq!(
        fields.get("request_id").and_then(Value::as_str),
        Some("req-42")
    );
    assert_eq!(fields.get("path").and_then(Value::as_str), Some("/articles"));
    assert_eq!(fields.get("status").and_then(Value::as_u64), Some(200));
    assert_eq!(fields.get("client_ip").and_then(Value::as_str), Some("local"));
}

#[test]
fn debug_chatter_stays_out_of_the_audit_stream() {
    let sink = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .json()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!(target: "ricebook_audit", path = "/articles", "audit");
    });

    assert!(sink.contents().is_empty(), "debug events must be filtered");
}
