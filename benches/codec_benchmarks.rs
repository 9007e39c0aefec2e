//! Codec benchmarks
//!
//! Throughput of the polymorphic codec on process specs of growing size:
//! - decode of a wire record through the tag dispatch
//! - encode (write form with link substitution)
//! - local validation against embedded templates

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use data_concepts::codec::{decode, dump, encode};
use data_concepts::validate::validate;
use data_concepts::{BaseValue, Bounds, Condition, ConditionTemplate, LinkByUid, ProcessSpec};

/// Process spec with `conditions` conditions, alternating embedded and
/// linked templates.
#[allow(clippy::cast_precision_loss)]
fn create_spec(conditions: usize) -> ProcessSpec {
    (0..conditions).fold(ProcessSpec::new("bench"), |spec, i| {
        let condition = Condition::new(format!("condition {i}"))
            .with_value(BaseValue::nominal_real(i as f64 % 100.0, "degC"));
        let condition = if i % 2 == 0 {
            condition.with_template(
                ConditionTemplate::new(format!("template {i}"), Bounds::real(0.0, 100.0, "degC"))
                    .with_uid("id", format!("ct-{i}")),
            )
        } else {
            condition.with_template(LinkByUid::new("id", format!("ct-{i}")))
        };
        spec.with_condition(condition)
    })
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for size in [1, 16, 256] {
        let wire = dump(&create_spec(size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &wire, |b, wire| {
            b.iter(|| decode(black_box(wire)).unwrap());
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for size in [1, 16, 256] {
        let spec = create_spec(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &spec, |b, spec| {
            b.iter(|| encode(black_box(spec)).unwrap());
        });
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");
    for size in [1, 16, 256] {
        let spec = create_spec(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &spec, |b, spec| {
            b.iter(|| validate(black_box(spec), &[]).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_validate);
criterion_main!(benches);
