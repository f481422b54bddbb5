use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;

use super::Emitter;
use crate::sample::MetricSample;

const QUEUE_CAPACITY: usize = 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Forward-protocol message entry: `[tag, time, record]`.
#[derive(Serialize)]
struct ForwardEntry<'a>(&'a str, i64, &'a MetricSample);

/// Ships records to a Fluentd `in_forward` input.
///
/// Entries are JSON-encoded, which `in_forward` accepts alongside msgpack.
/// `log` only enqueues; a background task owns the TCP connection, reconnects
/// lazily after a failure and drops records it cannot deliver. A collector
/// that stops reading gets its connection dropped after a write timeout, so
/// the task always exits once the emitter is dropped and the queue is drained.
pub struct FluentEmitter {
    tx: mpsc::Sender<Vec<u8>>,
    endpoint: String,
}

impl FluentEmitter {
    /// Must be called from within a tokio runtime.
    pub fn connect(host: &str, port: u16) -> Self {
        let endpoint = format!("{}:{}", host, port);
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(forward_records(endpoint.clone(), rx, WRITE_TIMEOUT));
        Self { tx, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Emitter for FluentEmitter {
    fn log(&self, tag: &str, fields: &MetricSample) {
        let entry = ForwardEntry(tag, Utc::now().timestamp(), fields);
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(tag, error = %error, "failed to encode record");
                return;
            }
        };
        line.push(b'\n');

        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(tag, endpoint = %self.endpoint, "fluentd queue full, dropping record");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(tag, "fluentd forwarder stopped, dropping record");
            }
        }
    }
}

async fn forward_records(
    endpoint: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
    write_timeout: Duration,
) {
    let mut stream: Option<TcpStream> = None;

    while let Some(record) = rx.recv().await {
        if stream.is_none() {
            match timeout(CONNECT_TIMEOUT, TcpStream::connect(&endpoint)).await {
                Ok(Ok(conn)) => {
                    tracing::debug!(endpoint = %endpoint, "connected to fluentd");
                    stream = Some(conn);
                }
                Ok(Err(error)) => {
                    tracing::warn!(endpoint = %endpoint, error = %error, "fluentd unreachable, dropping record");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(endpoint = %endpoint, "fluentd connect timed out, dropping record");
                    continue;
                }
            }
        }
        let Some(conn) = stream.as_mut() else {
            continue;
        };

        match timeout(write_timeout, conn.write_all(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(endpoint = %endpoint, error = %error, "fluentd write failed, dropping record");
                stream = None;
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint, "fluentd write timed out, dropping connection");
                stream = None;
            }
        }
    }

    tracing::debug!(endpoint = %endpoint, "fluentd forwarder stopped");
}
