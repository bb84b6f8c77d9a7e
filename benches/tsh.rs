use criterion::{criterion_group, criterion_main, Criterion};
use std::fs;
use tsh_analyzer::*;

fn bench_parse_tsh(c: &mut Criterion) {
    let bytes = fs::read("assets/sample.tsh").unwrap();
    c.bench_function("parse_tsh sample", |b| b.iter(|| parse_tsh(&bytes)));
}

fn bench_classify(c: &mut Criterion) {
    let bytes = fs::read("assets/sample.tsh").unwrap();
    let (_, records) = parse_tsh(&bytes).unwrap();
    c.bench_function("classify sample", |b| {
        b.iter(|| {
            records
                .iter()
                .filter(|r| r.is_tcp())
                .map(|r| classify::classify_tcp(r).payload_len())
                .sum::<u32>()
                + records.iter().map(|r| classify::classify_ip(r).len() as u32).sum::<u32>()
        })
    });
}

fn bench_process_trace(c: &mut Criterion) {
    let processor = TraceProcessor::with_iana().unwrap();
    let plain = TraceOptions::default();
    let flows = TraceOptions::default().with_flow_extraction(true);
    c.bench_function("process_trace sample", |b| {
        b.iter(|| processor.process_trace("assets/sample.tsh", &plain))
    });
    c.bench_function("process_trace sample with flows", |b| {
        b.iter(|| processor.process_trace("assets/sample.tsh", &flows))
    });
}

criterion_group!(benches, bench_parse_tsh, bench_classify, bench_process_trace);
criterion_main!(benches);
