use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use datadog_serializer::{
    CompressorKind, ItemTooBigPolicy, JsonArraySource, JsonStreamItem, PayloadBuilder,
    SerializerConfig, SharedConfig,
};
use serde::Serialize;

#[derive(Serialize)]
struct Serie {
    metric: String,
    points: Vec<(i64, f64)>,
    tags: Vec<String>,
}

impl JsonStreamItem for Serie {
    fn point_count(&self) -> usize {
        self.points.len()
    }

    fn describe(&self) -> String {
        self.metric.clone()
    }
}

fn series(count: usize) -> Vec<Serie> {
    (0..count)
        .map(|i| Serie {
            metric: format!("bench.metric.{}", i % 250),
            points: vec![(1_700_000_000 + i as i64, i as f64 * 0.5)],
            tags: vec![
                format!("host:host-{}", i % 32),
                format!("service:svc-{}", i % 8),
                "env:prod".to_string(),
            ],
        })
        .collect()
}

fn builder(kind: CompressorKind, share_buffers: bool) -> PayloadBuilder {
    let config = SharedConfig::new(SerializerConfig {
        compressor_kind: kind,
        share_buffers,
        ..SerializerConfig::default()
    });
    PayloadBuilder::from_config(config).expect("builder")
}

fn bench_build(c: &mut Criterion) {
    let items = series(10_000);

    for kind in [CompressorKind::Zstd, CompressorKind::Zlib] {
        let mut group = c.benchmark_group(format!("build_{kind}"));
        for share_buffers in [true, false] {
            let builder = builder(kind, share_buffers);
            let mode = if share_buffers { "shared" } else { "fresh" };
            group.bench_with_input(BenchmarkId::from_parameter(mode), &items, |b, items| {
                b.iter(|| {
                    let mut source = JsonArraySource::with_wrapper_key(items, "series");
                    black_box(builder.build(&mut source, ItemTooBigPolicy::Drop))
                });
            });
        }
        group.finish();
    }
}

fn bench_small_limits(c: &mut Criterion) {
    let items = series(2_000);
    let config = SharedConfig::new(SerializerConfig {
        max_payload_size: 4_096,
        max_uncompressed_payload_size: 16_384,
        compressor_kind: CompressorKind::Zstd,
        ..SerializerConfig::default()
    });
    let builder = PayloadBuilder::from_config(config).expect("builder");

    c.bench_function("build_many_payloads", |b| {
        b.iter(|| {
            let mut source = JsonArraySource::new(&items);
            black_box(builder.build(&mut source, ItemTooBigPolicy::Drop))
        });
    });
}

criterion_group!(benches, bench_build, bench_small_limits);
criterion_main!(benches);
