use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sessionnet::HeaderSet;

fn session_headers() -> HeaderSet {
    HeaderSet::from_pairs([
        ("Accept", "application/json"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Accept-Language", "en-GB,en;q=0.9"),
        ("Cache-Control", "no-cache"),
        ("User-Agent", "sessionnet/0.1 (linux; x86_64)"),
        ("X-Requested-With", "XMLHttpRequest"),
        ("X-Client-Version", "2.14.0"),
        ("X-Device-Id", "0d3b1f0c-7a4e-4b57-9a4c-5b8e9b1e7f21"),
    ])
    .unwrap()
}

fn benchmark_headers_merge(c: &mut Criterion) {
    let base = session_headers();
    let overlay =
        HeaderSet::from_pairs([("x-client-version", "2.15.0"), ("X-Trace", "1")]).unwrap();
    let request = HeaderSet::from_pairs([("Content-Type", "application/json")]).unwrap();

    // Per-dispatch snapshot: config, then overlay, then request headers.
    c.bench_function("headers_merge_snapshot", |b| {
        b.iter(|| {
            black_box(&base)
                .merged(black_box(&overlay))
                .merged(black_box(&request))
        })
    });
}

fn benchmark_headers_to_header_map(c: &mut Criterion) {
    let headers = session_headers();
    c.bench_function("headers_to_header_map", |b| {
        b.iter(|| black_box(&headers).to_header_map())
    });
}

fn benchmark_headers_insert(c: &mut Criterion) {
    c.bench_function("headers_insert", |b| {
        b.iter(|| {
            let mut headers = HeaderSet::new();
            headers.insert("Accept", "text/html").unwrap();
            headers.insert("User-Agent", "Mozilla/5.0").unwrap();
            headers.insert("accept", "application/json").unwrap();
            black_box(headers)
        })
    });
}

criterion_group!(
    benches,
    benchmark_headers_merge,
    benchmark_headers_to_header_map,
    benchmark_headers_insert
);
criterion_main!(benches);
