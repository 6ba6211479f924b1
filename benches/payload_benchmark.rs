use criterion::{Criterion, black_box, criterion_group, criterion_main};
use snap_solve::capture::TestCardCamera;
use snap_solve::payload::ImagePayload;

fn benchmark_payload(c: &mut Criterion) {
    let frame = TestCardCamera::default().size(1280, 720).render().to_image();

    c.bench_function("encode_jpeg_hd", |b| {
        b.iter(|| {
            let payload = ImagePayload::encode_jpeg(black_box(&frame), 80);
            assert!(payload.is_ok());
        })
    });

    let payload = match ImagePayload::encode_jpeg(&frame, 80) {
        Ok(payload) => payload,
        Err(err) => panic!("encoding failed: {}", err),
    };
    c.bench_function("base64_hd_jpeg", |b| {
        b.iter(|| black_box(&payload).to_base64())
    });
}

criterion_group!(benches, benchmark_payload);
criterion_main!(benches);
