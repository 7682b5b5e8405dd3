use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rconn::builtins::{self, BinTarget, RawObject};
use rconn::{BinType, BinVector, ByteOrderCodec, ConnectionRegistry};

fn codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("byte_order_codec");

    for len in [16usize, 1024, 65536] {
        let doubles = BinVector::Double((0..len).map(|i| i as f64 * 0.5).collect());
        let ints = BinVector::Integer((0..len as i32).collect());

        for swap in [false, true] {
            let codec = ByteOrderCodec::new(swap);
            let label = if swap { "swapped" } else { "native" };

            group.bench_with_input(
                BenchmarkId::new(format!("encode_double_{label}"), len),
                &doubles,
                |b, v| b.iter(|| black_box(codec.encode(black_box(v), None).unwrap())),
            );

            let bytes = codec.encode(&ints, Some(2)).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("decode_short_{label}"), len),
                &bytes,
                |b, bytes| {
                    b.iter(|| {
                        black_box(
                            codec
                                .decode(black_box(bytes), BinType::Integer, Some(2), true, len)
                                .unwrap(),
                        )
                    })
                },
            );
        }
    }

    group.finish();
}

fn raw_connection_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("raw_connection");
    let payload = builtins::write_bin(
        &ConnectionRegistry::new(),
        BinTarget::Raw,
        &BinVector::Double((0..4096).map(f64::from).collect()),
        None,
        false,
    )
    .unwrap()
    .unwrap();

    group.bench_function("read_bin_4096_doubles", |b| {
        let registry = ConnectionRegistry::new();
        b.iter(|| {
            let h = builtins::raw_connection(&registry, "bench", RawObject::Bytes(payload.clone()), "rb")
                .unwrap();
            let v = builtins::read_bin(
                &registry,
                builtins::BinSource::Connection(h),
                BinType::Double,
                4096,
                None,
                true,
                false,
            )
            .unwrap();
            builtins::close(&registry, h).unwrap();
            black_box(v)
        });
    });

    group.finish();
}

criterion_group!(benches, codec_benchmark, raw_connection_benchmark);
criterion_main!(benches);
