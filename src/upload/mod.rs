// src/upload/mod.rs

pub mod client;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, thread, time::Duration};
use tracing::{error, info, instrument, warn};

use crate::record::BeneficiaryRecord;

pub use client::HttpTransport;

/// Characters of a non-200 body kept in the error message.
const BODY_SNIPPET_CHARS: usize = 200;
/// Backend-reported errors echoed to the log per batch.
const ERRORS_SHOWN_PER_BATCH: usize = 3;

/// Contiguous groups of at most `size` records, in order.
pub fn partition<T>(records: &[T], size: usize) -> Vec<&[T]> {
    assert!(size > 0, "batch size must be positive");
    records.chunks(size).collect()
}

/// Body of a `POST /api/mutation` call.
#[derive(Debug, Serialize)]
pub struct MutationRequest<'a> {
    pub path: &'a str,
    pub args: MutationArgs<'a>,
}

#[derive(Debug, Serialize)]
pub struct MutationArgs<'a> {
    pub data: &'a [BeneficiaryRecord],
}

impl<'a> MutationRequest<'a> {
    pub fn new(path: &'a str, data: &'a [BeneficiaryRecord]) -> Self {
        Self {
            path,
            args: MutationArgs { data },
        }
    }
}

/// Raw HTTP answer as seen by the loop.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends one mutation call.
pub trait MutationTransport {
    fn post(&self, request: &MutationRequest<'_>) -> Result<TransportResponse, TransportError>;
}

impl<T: MutationTransport + ?Sized> MutationTransport for &T {
    fn post(&self, request: &MutationRequest<'_>) -> Result<TransportResponse, TransportError> {
        (**self).post(request)
    }
}

/// Counters the backend may return for a batch. Every field is optional.
/// Counters are read as plain JSON numbers; see [`count`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchReport {
    #[serde(default)]
    pub success: Option<f64>,
    #[serde(default)]
    pub failed: Option<f64>,
    #[serde(default)]
    pub duplicates: Option<f64>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Clamp a backend counter to a record count: fractions round, negatives and
/// non-finite values become 0, anything past `u64::MAX` saturates.
pub fn count(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.round() as u64
    } else {
        0
    }
}

/// What a 200 response turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResponse {
    Report(BatchReport),
    /// Any JSON that is not an object; the batch is taken as fully uploaded.
    Opaque,
}

impl MutationResponse {
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| anyhow!("invalid JSON response: {}", e))?;
        match value {
            Value::Object(_) => serde_json::from_value(value)
                .map(MutationResponse::Report)
                .map_err(|e| anyhow!("unexpected response shape: {}", e)),
            _ => Ok(MutationResponse::Opaque),
        }
    }
}

/// How a batch ended, for progress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    /// Backend answered with counters.
    #[default]
    Reported,
    /// Backend answered 200 without counters.
    Accepted,
    /// Nothing usable came back; the whole batch counts as failed.
    Failed,
}

/// Result of one batch, ready to be folded into [`UploadTotals`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub uploaded: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    fn all_failed(len: usize, error: String) -> Self {
        BatchOutcome {
            status: BatchStatus::Failed,
            failed: len as u64,
            errors: vec![error],
            ..Default::default()
        }
    }
}

/// Running totals across batches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadTotals {
    pub uploaded: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub errors: Vec<String>,
}

impl UploadTotals {
    pub fn record(&mut self, outcome: BatchOutcome) {
        self.uploaded = self.uploaded.saturating_add(outcome.uploaded);
        self.failed = self.failed.saturating_add(outcome.failed);
        self.duplicates = self.duplicates.saturating_add(outcome.duplicates);
        self.errors.extend(outcome.errors);
    }
}

fn error_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

/// Turn one transport result into a [`BatchOutcome`]. `batch_num` is 1-based.
pub fn classify(
    batch_num: usize,
    batch_len: usize,
    result: Result<TransportResponse, TransportError>,
) -> BatchOutcome {
    match result {
        Ok(resp) if resp.status == 200 => match MutationResponse::parse(&resp.body) {
            Ok(MutationResponse::Report(r)) => BatchOutcome {
                status: BatchStatus::Reported,
                uploaded: r.success.map_or(batch_len as u64, count),
                failed: r.failed.map_or(0, count),
                duplicates: r.duplicates.map_or(0, count),
                errors: r.errors.into_iter().map(error_text).collect(),
            },
            Ok(MutationResponse::Opaque) => BatchOutcome {
                status: BatchStatus::Accepted,
                uploaded: batch_len as u64,
                ..Default::default()
            },
            Err(e) => BatchOutcome::all_failed(batch_len, format!("Batch {}: {}", batch_num, e)),
        },
        Ok(resp) => BatchOutcome::all_failed(
            batch_len,
            format!("HTTP {}: {}", resp.status, snippet(&resp.body)),
        ),
        Err(TransportError::Timeout) => {
            BatchOutcome::all_failed(batch_len, format!("Batch {}: Timeout error", batch_num))
        }
        Err(TransportError::Other(msg)) => {
            BatchOutcome::all_failed(batch_len, format!("Batch {}: {}", batch_num, msg))
        }
    }
}

/// Sequential batch upload: one call per batch, a fixed pause after each,
/// no retries.
pub struct Uploader<T> {
    transport: T,
    mutation_path: String,
    batch_size: usize,
    pause: Duration,
}

impl<T: MutationTransport> Uploader<T> {
    pub fn new(
        transport: T,
        mutation_path: impl Into<String>,
        batch_size: usize,
        pause: Duration,
    ) -> Self {
        Self {
            transport,
            mutation_path: mutation_path.into(),
            batch_size,
            pause,
        }
    }

    /// Upload everything and return the totals. Per-batch failures are
    /// counted, never returned as errors.
    #[instrument(level = "info", skip_all, fields(records = records.len(), batch_size = self.batch_size))]
    pub fn run(&self, records: &[BeneficiaryRecord]) -> UploadTotals {
        let batches = partition(records, self.batch_size);
        let total_batches = batches.len();
        let mut totals = UploadTotals::default();

        for (i, batch) in batches.into_iter().enumerate() {
            let batch_num = i + 1;
            let request = MutationRequest::new(&self.mutation_path, batch);
            let outcome = classify(batch_num, batch.len(), self.transport.post(&request));

            log_outcome(batch_num, total_batches, records.len(), &totals, &outcome);
            totals.record(outcome);

            if !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
        }

        totals
    }
}

fn log_outcome(
    batch_num: usize,
    total_batches: usize,
    total_records: usize,
    before: &UploadTotals,
    outcome: &BatchOutcome,
) {
    match outcome.status {
        BatchStatus::Failed => error!(
            "Batch {}/{} failed: {}",
            batch_num,
            total_batches,
            outcome.errors.first().map(String::as_str).unwrap_or_default()
        ),
        BatchStatus::Accepted => info!(
            "Batch {}/{}: {} records uploaded (Total: {}/{})",
            batch_num,
            total_batches,
            outcome.uploaded,
            before.uploaded.saturating_add(outcome.uploaded),
            total_records
        ),
        BatchStatus::Reported => {
            info!(
                "Batch {}/{}: {} ok, {} failed, {} duplicate (Total: {}/{})",
                batch_num,
                total_batches,
                outcome.uploaded,
                outcome.failed,
                outcome.duplicates,
                before.uploaded.saturating_add(outcome.uploaded),
                total_records
            );
            for e in outcome.errors.iter().take(ERRORS_SHOWN_PER_BATCH) {
                warn!("  {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque};

    /// Replays canned results and remembers what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: RefCell<VecDeque<Result<TransportResponse, TransportError>>>,
        sent: RefCell<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<TransportResponse, TransportError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                sent: RefCell::default(),
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.sent
                .borrow()
                .iter()
                .map(|b| b["args"]["data"].as_array().unwrap().len())
                .collect()
        }
    }

    impl MutationTransport for ScriptedTransport {
        fn post(&self, request: &MutationRequest<'_>) -> Result<TransportResponse, TransportError> {
            self.sent
                .borrow_mut()
                .push(serde_json::to_value(request).unwrap());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(ok(r#"{"success":0}"#)))
        }
    }

    fn ok(body: &str) -> TransportResponse {
        TransportResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn records(n: usize) -> Vec<BeneficiaryRecord> {
        (0..n)
            .map(|i| BeneficiaryRecord {
                no: Some(i as f64),
                name: Some(format!("Kişi {}", i)),
                ..Default::default()
            })
            .collect()
    }

    fn uploader(t: &ScriptedTransport) -> Uploader<&ScriptedTransport> {
        Uploader::new(t, "beneficiaries:importExportDataBatch", 50, Duration::ZERO)
    }

    #[test]
    fn test_partition_counts_and_order() {
        for n in [0usize, 1, 49, 50, 51, 120, 951] {
            let recs = records(n);
            let parts = partition(&recs, 50);
            assert_eq!(parts.len(), (n + 49) / 50, "n = {n}");
            assert!(parts.iter().all(|p| !p.is_empty() && p.len() <= 50));
            let joined: Vec<_> = parts.concat();
            assert_eq!(joined, recs);
        }
    }

    #[test]
    fn test_request_body_shape() {
        let recs = records(2);
        let req = MutationRequest::new("beneficiaries:importExportDataBatch", &recs);
        let body = serde_json::to_value(req).unwrap();
        assert_eq!(body["path"], "beneficiaries:importExportDataBatch");
        let data = body["args"]["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1]["no"], 1.0);
        assert!(data[1]["telefon"].is_null());
    }

    #[test]
    fn test_reported_counts_are_added() {
        let t = ScriptedTransport::new(vec![Ok(ok(
            r#"{"success":48,"failed":2,"duplicates":0,"errors":["row X bad"]}"#,
        ))]);
        let totals = uploader(&t).run(&records(50));
        assert_eq!(totals.uploaded, 48);
        assert_eq!(totals.failed, 2);
        assert_eq!(totals.duplicates, 0);
        assert_eq!(totals.errors, vec!["row X bad".to_string()]);
    }

    #[test]
    fn test_missing_counters_use_defaults() {
        let out = classify(1, 50, Ok(ok(r#"{"duplicates":3}"#)));
        assert_eq!(out.status, BatchStatus::Reported);
        assert_eq!(out.uploaded, 50);
        assert_eq!(out.failed, 0);
        assert_eq!(out.duplicates, 3);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_non_string_errors_kept_as_json() {
        let out = classify(1, 2, Ok(ok(r#"{"success":1,"failed":1,"errors":[{"row":4}]}"#)));
        assert_eq!(out.errors, vec![r#"{"row":4}"#.to_string()]);
    }

    #[test]
    fn test_non_object_body_counts_as_uploaded() {
        for body in ["null", "\"ok\"", "[1,2]", "12"] {
            let out = classify(1, 20, Ok(ok(body)));
            assert_eq!(out.status, BatchStatus::Accepted, "body {body}");
            assert_eq!(out.uploaded, 20);
            assert!(out.errors.is_empty());
        }
    }

    #[test]
    fn test_float_and_negative_counters_are_clamped() {
        let out = classify(1, 50, Ok(ok(r#"{"success":48.0,"failed":1.6,"duplicates":-3}"#)));
        assert_eq!(out.status, BatchStatus::Reported);
        assert_eq!(out.uploaded, 48);
        assert_eq!(out.failed, 2);
        assert_eq!(out.duplicates, 0);

        let out = classify(1, 50, Ok(ok(r#"{"success":null,"failed":null}"#)));
        assert_eq!(out.uploaded, 50);
        assert_eq!(out.failed, 0);
    }

    #[test]
    fn test_huge_counters_saturate_instead_of_overflowing() {
        let t = ScriptedTransport::new(vec![
            Ok(ok(r#"{"success":18446744073709551615,"failed":18446744073709551615}"#)),
            Ok(ok(r#"{"success":18446744073709551615,"failed":18446744073709551615}"#)),
        ]);
        let totals = uploader(&t).run(&records(60));
        assert_eq!(t.batch_sizes(), vec![50, 10]);
        assert_eq!(totals.uploaded, u64::MAX);
        assert_eq!(totals.failed, u64::MAX);

        let mut totals = UploadTotals {
            duplicates: u64::MAX - 1,
            ..Default::default()
        };
        totals.record(BatchOutcome {
            duplicates: 5,
            ..Default::default()
        });
        assert_eq!(totals.duplicates, u64::MAX);
    }

    #[test]
    fn test_http_500_fails_whole_batch() {
        let body = "x".repeat(500);
        let t = ScriptedTransport::new(vec![Ok(TransportResponse { status: 500, body })]);
        let totals = uploader(&t).run(&records(50));
        assert_eq!(totals.uploaded, 0);
        assert_eq!(totals.failed, 50);
        assert_eq!(totals.errors.len(), 1);
        assert!(totals.errors[0].starts_with("HTTP 500: "));
        assert_eq!(totals.errors[0].len(), "HTTP 500: ".len() + 200);
    }

    #[test]
    fn test_timeout_fails_batch_and_continues() {
        let t = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Ok(ok(r#"{"success":10}"#)),
        ]);
        let totals = uploader(&t).run(&records(60));
        assert_eq!(t.batch_sizes(), vec![50, 10]);
        assert_eq!(totals.failed, 50);
        assert_eq!(totals.uploaded, 10);
        assert_eq!(totals.errors, vec!["Batch 1: Timeout error".to_string()]);
    }

    #[test]
    fn test_transport_and_parse_errors_are_tagged() {
        let out = classify(3, 5, Err(TransportError::Other("connection refused".into())));
        assert_eq!(out.failed, 5);
        assert_eq!(out.errors, vec!["Batch 3: connection refused".to_string()]);

        let out = classify(4, 5, Ok(ok("<html>oops</html>")));
        assert_eq!(out.status, BatchStatus::Failed);
        assert_eq!(out.failed, 5);
        assert!(out.errors[0].starts_with("Batch 4: invalid JSON response"));
    }

    #[test]
    fn test_end_to_end_120_records() {
        let t = ScriptedTransport::new(vec![
            Ok(ok(r#"{"success":49,"failed":0,"duplicates":1,"errors":[]}"#)),
            Ok(TransportResponse {
                status: 502,
                body: "bad gateway".into(),
            }),
            Ok(ok(r#"{"success":18,"failed":1,"duplicates":1,"errors":["row 119 bad"]}"#)),
        ]);
        let totals = uploader(&t).run(&records(120));

        assert_eq!(t.batch_sizes(), vec![50, 50, 20]);
        assert_eq!(totals.uploaded, 67);
        assert_eq!(totals.failed, 51);
        assert_eq!(totals.duplicates, 2);
        assert_eq!(totals.uploaded + totals.failed, 120 - totals.duplicates);
        assert_eq!(
            totals.errors,
            vec!["HTTP 502: bad gateway".to_string(), "row 119 bad".to_string()]
        );

        // records arrive in file order
        let sent = t.sent.borrow();
        assert_eq!(sent[1]["args"]["data"][0]["no"], 50.0);
        assert_eq!(sent[2]["args"]["data"][19]["no"], 119.0);
    }

    #[test]
    fn test_empty_input_sends_nothing() {
        let t = ScriptedTransport::default();
        let totals = uploader(&t).run(&[]);
        assert!(t.sent.borrow().is_empty());
        assert_eq!(totals, UploadTotals::default());
    }
}
