use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use udpst_wire::{decode_any, LoadPdu, SetupPdu};

fn sample_load_pdu() -> LoadPdu {
    LoadPdu {
        test_action: 0,
        rx_stopped: false,
        lpdu_seq_no: 123_456,
        udp_payload: 1200,
        spdu_seq_err: 0,
        spdu_time_sec: 1_700_000_000,
        spdu_time_nsec: 500_000,
        lpdu_time_sec: 1_700_000_000,
        lpdu_time_nsec: 750_000,
        rtt_response_delay_ms: 4,
    }
}

fn sample_setup_pdu() -> SetupPdu {
    SetupPdu {
        protocol_version: 7,
        mc_index: 0,
        mc_count: 1,
        mc_ident: 0xDEAD_BEEF,
        cmd_request: 1,
        cmd_response: 0,
        max_bandwidth: 100_000,
        jumbo: false,
        traditional_mtu: false,
        auth_mode: 0,
        auth_unix_time: 1_700_000_000,
        key_id: 0,
        test_port: 0,
        digest: [0u8; udpst_wire::AUTH_DIGEST_LENGTH],
    }
}

fn bench_load_pdu(c: &mut Criterion) {
    let pdu = sample_load_pdu();
    let mut g = c.benchmark_group("load_pdu");

    g.bench_function("encode", |b| b.iter(|| black_box(pdu.encode())));

    let encoded = pdu.encode();
    g.bench_function("decode", |b| b.iter(|| black_box(LoadPdu::decode(black_box(&encoded)).unwrap())));

    g.finish();
}

fn bench_setup_pdu(c: &mut Criterion) {
    let pdu = sample_setup_pdu();
    let mut g = c.benchmark_group("setup_pdu");

    g.bench_function("encode", |b| b.iter(|| black_box(pdu.encode())));

    let encoded = pdu.encode();
    g.bench_function("decode", |b| b.iter(|| black_box(SetupPdu::decode(black_box(&encoded)).unwrap())));

    g.finish();
}

fn bench_decode_any(c: &mut Criterion) {
    let encoded = sample_load_pdu().encode();
    c.bench_function("decode_any_load", |b| b.iter(|| black_box(decode_any(black_box(&encoded)).unwrap())));
}

criterion_group!(benches, bench_load_pdu, bench_setup_pdu, bench_decode_any);
criterion_main!(benches);
