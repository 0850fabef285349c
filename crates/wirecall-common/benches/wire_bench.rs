// Criterion benchmarks for the wirecall-common wire and transform layers
//
// Run benchmarks with:
//   cargo bench -p wirecall-common
//
// For detailed output with plots:
//   cargo bench -p wirecall-common -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use wirecall_common::protocol::{Request, ResponseEnvelope};
use wirecall_common::transform::{Model, Schema, Transformer};
use wirecall_common::wire::{ValueReader, ValueWriter, WireToken, WireWriter};
use wirecall_common::wire_model;

#[derive(Debug, Default)]
struct Order {
    order_id: i64,
    customer: String,
    paid: bool,
    lines: Vec<String>,
    note: Option<String>,
}

impl Model for Order {
    fn describe(schema: &mut Schema<'_, Self>) {
        schema
            .field("order_id", |m| &m.order_id, |m| &mut m.order_id)
            .field("customer", |m| &m.customer, |m| &mut m.customer)
            .field("paid", |m| &m.paid, |m| &mut m.paid)
            .field("lines", |m| &m.lines, |m| &mut m.lines)
            .field("note", |m| &m.note, |m| &mut m.note);
    }
}

wire_model!(Order);

fn encode_value(value: &Value) -> Vec<u8> {
    let mut writer = WireWriter::new();
    ValueWriter::write(&mut writer, value).unwrap();
    writer.finish().unwrap()
}

fn sample_order() -> Order {
    Order {
        order_id: 1001,
        customer: "acme".to_string(),
        paid: true,
        lines: (0..20).map(|i| format!("sku_{}", i)).collect(),
        note: None,
    }
}

fn bench_generic_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("generic_codec");

    let small = json!({"value": 42});
    let medium = json!({"values": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10], "name": "medium"});
    let data: Vec<String> = (0..100).map(|i| format!("item_{}", i)).collect();
    let large = json!({ "data": data, "nested": {"flag": true, "depth": {"n": 3}} });

    group.bench_function("write_small", |b| b.iter(|| encode_value(black_box(&small))));
    group.bench_function("write_medium", |b| b.iter(|| encode_value(black_box(&medium))));
    group.bench_function("write_large", |b| b.iter(|| encode_value(black_box(&large))));

    let small_bytes = encode_value(&small);
    let large_bytes = encode_value(&large);
    group.bench_function("read_small", |b| {
        b.iter(|| ValueReader::dump(black_box(&small_bytes)))
    });
    group.bench_function("read_large", |b| {
        b.iter(|| ValueReader::dump(black_box(&large_bytes)))
    });

    group.finish();
}

fn bench_typed_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("typed_codec");
    let transformer = Transformer::new();
    let order = sample_order();
    let bytes = transformer.encode(&order).unwrap();

    group.bench_function("encode_model", |b| {
        b.iter(|| transformer.encode(black_box(&order)))
    });
    group.bench_function("decode_model", |b| {
        b.iter(|| transformer.decode::<Order>(black_box(&bytes)))
    });
    group.bench_function("cached_adapter_lookup", |b| {
        b.iter(|| transformer.adapter::<Order>())
    });

    group.finish();
}

fn bench_envelopes(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelopes");
    let transformer = Transformer::new();
    let adapter = transformer.adapter::<Order>().unwrap();

    group.bench_function("build_request", |b| {
        b.iter(|| {
            Request::new(black_box("getOrder"), |w| {
                w.write_name("orderId", WireToken::Number)?;
                w.write_number(black_box(1001))
            })
        })
    });

    let reply = ResponseEnvelope {
        code: 0,
        message: None,
        data: Some(ValueReader::dump(&transformer.encode(&sample_order()).unwrap()).unwrap()[0].clone()),
    }
    .encode()
    .unwrap();
    group.bench_function("decode_response", |b| {
        b.iter(|| ResponseEnvelope::decode_with(black_box(&reply), adapter.as_ref()))
    });

    group.finish();
}

criterion_group!(benches, bench_generic_codec, bench_typed_codec, bench_envelopes);
criterion_main!(benches);
