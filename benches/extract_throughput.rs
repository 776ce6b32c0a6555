//! Reply extraction and request throughput benchmarks.
//!
//! Run with: `cargo bench`

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use threat_proxy::{
    parse_classification, start_proxy_with_backend, validate, CompletionBackend,
    CompletionRequest, ProxyOptions, RawSubmission,
};
use tokio::runtime::Runtime;

const VERDICT: &str = r#"{"threat_level": "phishing", "confidence_score": 91, "analysis_summary": "Credential harvesting link behind urgency language.", "indicators": ["Urgency", "Shortened URL", "Look-alike domain"]}"#;

/// Backend that answers instantly with a fixed verdict.
struct Canned;

#[async_trait]
impl CompletionBackend for Canned {
    async fn complete(&self, _request: &CompletionRequest) -> threat_proxy::Result<String> {
        Ok(format!("Sure! Here is the result:\n```json\n{VERDICT}\n```"))
    }
}

/// Model reply with `padding` bytes of prose (and stray braces) around the verdict.
fn padded_reply(padding: usize) -> String {
    let prose = "The sender {claims} to be support staff. ".repeat(padding / 40 + 1);
    format!("{prose}\n```json\n{VERDICT}\n```\n{prose}")
}

fn benchmark_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply_extraction");

    for padding in [0_usize, 1_024, 16_384] {
        let reply = padded_reply(padding);
        group.throughput(Throughput::Bytes(reply.len() as u64));
        group.bench_with_input(BenchmarkId::new("padding", padding), &reply, |b, reply| {
            b.iter(|| parse_classification(black_box(reply)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_validation(c: &mut Criterion) {
    let raw = RawSubmission {
        subject: Some("Urgent: verify your account".to_string()),
        sender: Some("security@paypal-support.net".to_string()),
        recipient: Some("student@university.edu".to_string()),
        body: Some("Click here within 24 hours or your account will be suspended. ".repeat(200)),
    };

    c.bench_function("validate_submission", |b| {
        b.iter(|| validate(black_box(&raw)).unwrap());
    });
}

fn benchmark_analyze_endpoint(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let server = rt
        .block_on(start_proxy_with_backend(
            ProxyOptions {
                http_port: Some(0),
                ..Default::default()
            },
            Arc::new(Canned),
        ))
        .unwrap();
    let url = format!("http://127.0.0.1:{}/analyze-email", server.http_addr.port());
    let client = reqwest::Client::new();
    let body = json!({
        "subject": "Urgent: verify your account",
        "sender": "security@paypal-support.net",
        "body": "Click here within 24 hours or your account will be suspended: http://bit.ly/xyz"
    });

    let mut group = c.benchmark_group("analyze_email");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            let resp = client.post(&url).json(&body).send().await.unwrap();
            assert!(resp.status().is_success());
        });
    });

    group.finish();
    rt.block_on(server.stop());
}

criterion_group!(
    benches,
    benchmark_extraction,
    benchmark_validation,
    benchmark_analyze_endpoint,
);
criterion_main!(benches);
