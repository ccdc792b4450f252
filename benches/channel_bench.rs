// benches/channel_bench.rs
//! Body streaming throughput through a channel pair

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use mirage::channel::{Body, ChannelHub, ChannelPair};
use mirage::context::LoopbackContext;
use mirage::wire::PortPayload;

const TOTAL_BYTES: usize = 1024 * 1024;
const CHUNK_BYTES: usize = 64 * 1024;

fn body_streaming(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("body_streaming");
    group.throughput(Throughput::Bytes(TOTAL_BYTES as u64));
    group.bench_function("pump_1mib_64k_chunks", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let hub = ChannelHub::new(LoopbackContext::new());
                let pair = ChannelPair::new(&hub);

                let chunk = Bytes::from(vec![0u8; CHUNK_BYTES]);
                let producer = pair.left;
                tokio::spawn(async move {
                    for _ in 0..(TOTAL_BYTES / CHUNK_BYTES) {
                        producer.send(PortPayload::Chunk(chunk.clone())).unwrap();
                    }
                    producer.send(PortPayload::Fin).unwrap();
                    producer.close();
                });

                let collected = Body::from_endpoint(pair.right).unwrap().collect().await;
                assert_eq!(collected.len(), TOTAL_BYTES);
            });
        });
    });
    group.finish();
}

criterion_group!(benches, body_streaming);
criterion_main!(benches);
