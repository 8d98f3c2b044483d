use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use multicast_tester::config::StreamConfig;
use multicast_tester::rtp::h264::split_annexb;
use multicast_tester::rtp::{Frame, H264Payloader, PacketSink, ParameterSet, RtpPacket, RtpPacketizer};

#[derive(Default)]
struct CountingSink {
    packets: AtomicU64,
}

impl PacketSink for CountingSink {
    fn enqueue(&self, _packet: RtpPacket) -> bool {
        self.packets.fetch_add(1, Ordering::Relaxed);
        true
    }
}

fn access_unit(nal_type: u8, size: usize) -> Bytes {
    let mut data = vec![0, 0, 0, 1, 0x60 | nal_type];
    data.extend((0..size).map(|i| (i % 251) as u8 | 1));
    Bytes::from(data)
}

fn benchmark_packetizer(c: &mut Criterion) {
    let packetizer = RtpPacketizer::new(&StreamConfig::default(), CountingSink::default())
        .expect("default MTU fits");
    packetizer.set_parameter_set(ParameterSet::copy_from(
        &[0x67, 0x42, 0x00, 0x1F, 0x8C, 0x8D, 0x40],
        &[0x68, 0xCE, 0x3C, 0x80],
    ));

    let mut group = c.benchmark_group("RtpPacketizer");
    for (name, nal_type, size) in [("P slice 4K", 1u8, 4_000usize), ("IDR 64K", 5, 64_000)] {
        let payload = access_unit(nal_type, size);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_function(name, |b| {
            let mut pts = Duration::ZERO;
            b.iter_batched(
                || {
                    pts += Duration::from_millis(33);
                    Frame::new(payload.clone(), pts)
                },
                |frame| packetizer.submit(frame),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn benchmark_annexb(c: &mut Criterion) {
    let mut stream = Vec::new();
    for _ in 0..30 {
        stream.extend_from_slice(&access_unit(1, 2_000));
    }

    c.bench_function("split_annexb 30 units", |b| {
        b.iter(|| split_annexb(&stream).len())
    });
}

fn benchmark_fu_a(c: &mut Criterion) {
    let payloader = H264Payloader::new(1388);
    let nalu = access_unit(5, 100_000).slice(4..);
    let mut out = Vec::with_capacity(128);

    c.bench_function("FU-A 100K NAL", |b| {
        b.iter(|| {
            out.clear();
            payloader.payload_nal(&nalu, &mut out);
            out.len()
        })
    });
}

criterion_group!(benches, benchmark_packetizer, benchmark_annexb, benchmark_fu_a);
criterion_main!(benches);
