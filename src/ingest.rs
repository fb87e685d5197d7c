//! Queue consumer: pulls telemetry records from a source and scores each
//! one through the point path.
//!
//! Cancellation is only observed while waiting for the next record, so a
//! scoring call that has started always completes before the loop exits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::features::TelemetryRecord;
use crate::service::InferenceService;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("undecodable record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A stream of telemetry records. `None` means the source is exhausted.
#[async_trait]
pub trait TelemetrySource: Send {
    async fn next_record(&mut self) -> Option<Result<TelemetryRecord, IngestError>>;
}

/// In-process queue fed through an `mpsc::Sender`.
pub struct ChannelSource {
    rx: mpsc::Receiver<TelemetryRecord>,
}

impl ChannelSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<TelemetryRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl TelemetrySource for ChannelSource {
    async fn next_record(&mut self) -> Option<Result<TelemetryRecord, IngestError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// One JSON record per line, e.g. stdin or a replayed capture file.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TelemetrySource for JsonLinesSource<R> {
    async fn next_record(&mut self) -> Option<Result<TelemetryRecord, IngestError>> {
        loop {
            let text = match self.lines.next_line().await {
                Ok(Some(text)) => text,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            let line = self.line;
            return Some(
                serde_json::from_str(&text).map_err(|source| IngestError::Decode { line, source }),
            );
        }
    }
}

/// Totals for one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub consumed: u64,
    pub scored: u64,
    pub failed: u64,
    pub malformed: u64,
}

/// Consume until the source is exhausted, fails, or `cancel` fires.
pub async fn run_consumer<S: TelemetrySource>(
    service: Arc<InferenceService>,
    mut source: S,
    cancel: CancellationToken,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    info!("telemetry consumer started");

    loop {
        let item = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("consumer cancelled");
                break;
            }
            item = source.next_record() => item,
        };

        let record = match item {
            None => {
                debug!("telemetry source exhausted");
                break;
            }
            Some(Ok(record)) => record,
            Some(Err(IngestError::Decode { line, source })) => {
                stats.malformed += 1;
                warn!(line, error = %source, "skipping undecodable record");
                continue;
            }
            Some(Err(e)) => {
                warn!(error = %e, "telemetry source failed, stopping consumer");
                break;
            }
        };

        stats.consumed += 1;
        match service.predict(&record) {
            Ok(result) => {
                stats.scored += 1;
                info!(
                    record_id = record.id.as_deref().unwrap_or("-"),
                    anomaly = result.anomaly,
                    failure_probability = result.failure_probability,
                    prediction = result.prediction,
                    "record scored"
                );
            }
            // Already logged with its correlation id by the service.
            Err(_) => stats.failed += 1,
        }
    }

    info!(
        consumed = stats.consumed,
        scored = stats.scored,
        failed = stats.failed,
        malformed = stats.malformed,
        "telemetry consumer stopped"
    );
    stats
}

/// Start a consumer behind an in-process queue of `capacity` records.
/// It stops once every sender is dropped or `cancel` fires.
pub fn spawn_queue_consumer(
    service: Arc<InferenceService>,
    capacity: usize,
    cancel: CancellationToken,
) -> (mpsc::Sender<TelemetryRecord>, JoinHandle<ConsumerStats>) {
    let (tx, source) = ChannelSource::channel(capacity);
    let handle = tokio::spawn(run_consumer(service, source, cancel));
    (tx, handle)
}

/// Push decoded records from `source` into a queue, skipping undecodable
/// ones. Returns the number of records forwarded.
pub async fn forward<S: TelemetrySource>(
    mut source: S,
    tx: mpsc::Sender<TelemetryRecord>,
    cancel: CancellationToken,
) -> u64 {
    let mut forwarded = 0;
    loop {
        let item = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            item = source.next_record() => item,
        };
        match item {
            None => break,
            Some(Ok(record)) => {
                if tx.send(record).await.is_err() {
                    debug!("queue consumer gone, stopping forwarder");
                    break;
                }
                forwarded += 1;
            }
            Some(Err(IngestError::Decode { line, source })) => {
                warn!(line, error = %source, "skipping undecodable record");
            }
            Some(Err(e)) => {
                warn!(error = %e, "telemetry source failed, stopping forwarder");
                break;
            }
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::features::DomainVariant;
    use crate::model::{LogisticModel, ModelArtifactSet, StandardScaler, ZScoreEnvelope};
    use tokio::io::BufReader;

    fn service() -> Arc<InferenceService> {
        let mut config = ServiceConfig::default();
        config.features.variant = DomainVariant::Engine;
        let artifacts = ModelArtifactSet::default()
            .with_scaler(StandardScaler::new(vec![0.0; 5], vec![1.0; 5]))
            .with_anomaly_detector(ZScoreEnvelope::new(3.0))
            .with_classifier(LogisticModel::new(vec![0.0, 0.0, 0.0, 1.0, 0.0], -1.0));
        Arc::new(InferenceService::new(artifacts, &config).unwrap())
    }

    fn record(vibration: f64) -> TelemetryRecord {
        TelemetryRecord::new().with_field("vibration_level", vibration)
    }

    #[tokio::test]
    async fn test_channel_consumer_scores_until_closed() {
        let service = service();
        let (tx, source) = ChannelSource::channel(8);
        for v in [0.0, 5.0, 0.5] {
            tx.send(record(v)).await.unwrap();
        }
        drop(tx);

        let stats = run_consumer(Arc::clone(&service), source, CancellationToken::new()).await;
        assert_eq!(stats.consumed, 3);
        assert_eq!(stats.scored, 3);
        assert_eq!(service.metric_counts().predictions_total, 3);
        assert_eq!(service.metric_counts().anomalies_total, 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_idle_consumer() {
        let service = service();
        let (tx, source) = ChannelSource::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_consumer(Arc::clone(&service), source, cancel.clone()));

        tx.send(record(0.0)).await.unwrap();
        while service.metric_counts().predictions_total < 1 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        // The sender is still open, so only cancellation can end the loop.
        let stats = handle.await.unwrap();
        assert_eq!(stats.consumed, 1);
        assert_eq!(stats.scored, 1);
        drop(tx);
    }

    #[tokio::test]
    async fn test_json_lines_skips_malformed_records() {
        let input = "{\"id\": \"a\", \"vibration_level\": 0.2}\n\nnot json\n{\"vibration_level\": 7}\n";
        let source = JsonLinesSource::new(BufReader::new(input.as_bytes()));

        let stats = run_consumer(service(), source, CancellationToken::new()).await;
        assert_eq!(
            stats,
            ConsumerStats {
                consumed: 2,
                scored: 2,
                failed: 0,
                malformed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_decode_error_reports_line_number() {
        let input = "{}\n\n{\"vibration_level\": \"high\"}\n";
        let mut source = JsonLinesSource::new(BufReader::new(input.as_bytes()));
        assert!(source.next_record().await.unwrap().is_ok());
        match source.next_record().await {
            Some(Err(IngestError::Decode { line, .. })) => assert_eq!(line, 3),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(source.next_record().await.is_none());
    }

    #[tokio::test]
    async fn test_forwarded_lines_reach_queue_consumer() {
        let service = service();
        let cancel = CancellationToken::new();
        let (tx, handle) = spawn_queue_consumer(Arc::clone(&service), 4, cancel.clone());

        let input = "{\"vibration_level\": 0.1}\n{oops\n{\"vibration_level\": 8}\n";
        let source = JsonLinesSource::new(BufReader::new(input.as_bytes()));
        let forwarded = forward(source, tx, cancel).await;
        assert_eq!(forwarded, 2);

        let stats = handle.await.unwrap();
        assert_eq!(stats.scored, 2);
        assert_eq!(service.metric_counts().anomalies_total, 1);
    }

    #[tokio::test]
    async fn test_scoring_failures_are_counted() {
        let config = ServiceConfig::default();
        let service = Arc::new(InferenceService::new(ModelArtifactSet::default(), &config).unwrap());
        let (tx, source) = ChannelSource::channel(2);
        tx.send(record(0.0)).await.unwrap();
        drop(tx);

        let stats = run_consumer(service, source, CancellationToken::new()).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.scored, 0);
    }
}
