use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use embedded_mqtt::network::application::mqtt::packet::{decode_remaining_length, encode_remaining_length};
use embedded_mqtt::network::application::mqtt::topic::topic_matches;

fn bench_remaining_length_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("remaining_length");

    // One representative value per variable-byte-integer length class.
    let values = [0u32, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455];

    for value in values {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(format!("encode/{value}"), &value, |b, &value| {
            b.iter(|| {
                let mut buf = [0u8; 4];
                encode_remaining_length(&mut buf, value).unwrap()
            });
        });

        let mut encoded = [0u8; 4];
        let len = encode_remaining_length(&mut encoded, value).unwrap();
        group.bench_with_input(format!("decode/{value}"), &encoded[..len], |b, encoded| {
            b.iter(|| decode_remaining_length(encoded).unwrap());
        });
    }

    group.finish();
}

fn bench_topic_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_matches");

    let cases = [
        ("sensors/kitchen/temp", "sensors/kitchen/temp"),
        ("sensors/+/temp", "sensors/kitchen/temp"),
        ("sensors/#", "sensors/kitchen/temp/celsius"),
        ("a/b/c/d/e/f/g/h", "a/b/c/d/e/f/g/x"),
    ];

    for (filter, topic) in cases {
        group.throughput(Throughput::Bytes(topic.len() as u64));
        group.bench_with_input(format!("{filter}_vs_{topic}"), &(filter, topic), |b, &(filter, topic)| {
            b.iter_batched(|| (), |()| topic_matches(filter, topic), BatchSize::SmallInput);
        });
    }

    group.finish();
}

criterion_group!(benches, bench_remaining_length_codec, bench_topic_matches);
criterion_main!(benches);
