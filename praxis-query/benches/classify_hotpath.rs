use criterion::{criterion_group, criterion_main, Criterion};
use praxis_core::ThrottleConfig;
use praxis_query::{BackendError, RateLimitClassifier, ThrottleTracker};
use std::hint::black_box;

fn bench_classify(c: &mut Criterion) {
    let classifier = RateLimitClassifier::default();
    let throttle_page = BackendError::from_http(200, "<html><body>Too Many Requests</body></html>");
    let constraint = BackendError::from_http(
        409,
        r#"{"code":"23505","message":"duplicate key value violates unique constraint \"todos_pkey\""}"#,
    );

    c.bench_function("classify/malformed_response", |b| {
        b.iter(|| black_box(classifier.classify(black_box(&throttle_page))));
    });
    c.bench_function("classify/terminal_phrase_scan", |b| {
        b.iter(|| black_box(classifier.classify(black_box(&constraint))));
    });
    c.bench_function("classify/from_http_json_body", |b| {
        b.iter(|| {
            black_box(BackendError::from_http(
                black_box(503),
                black_box(r#"{"message":"upstream rate limit reached"}"#),
            ))
        });
    });
}

fn bench_throttle(c: &mut Criterion) {
    let tracker = ThrottleTracker::new(ThrottleConfig {
        window_ms: 1,
        ceiling: 10,
        pause_ms: 0,
    });

    c.bench_function("throttle/register_call", |b| {
        b.iter(|| black_box(tracker.register_call()));
    });
}

criterion_group!(benches, bench_classify, bench_throttle);
criterion_main!(benches);
