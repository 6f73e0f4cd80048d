use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rustml_core::Shape;
use rustml_gemm::{
    fp16_pack_info, gemm_fp16_packed, gemm_int8_packed, int8_pack_info, pack_fp16, pack_int8,
};

fn make_matrix(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.013).sin()).collect()
}

fn packed_fp16(k: usize, n: usize) -> Vec<u8> {
    let info = fp16_pack_info(&Shape::new([k, n]), false).unwrap();
    let mut buf = vec![0u8; info.packsize as usize];
    pack_fp16(&mut buf, &make_matrix(k * n), false, &info).unwrap();
    buf
}

fn packed_int8(k: usize, n: usize) -> Vec<u8> {
    let info = int8_pack_info(&Shape::new([k, n]), false).unwrap();
    let mut buf = vec![0u8; info.packsize as usize];
    pack_int8(&mut buf, &make_matrix(k * n), false, k, n, info.packsize).unwrap();
    buf
}

fn bench_pack(c: &mut Criterion) {
    let (k, n) = (768, 768);
    let src = make_matrix(k * n);
    let mut group = c.benchmark_group("pack");

    let info = fp16_pack_info(&Shape::new([k, n]), false).unwrap();
    let mut buf = vec![0u8; info.packsize as usize];
    group.bench_function("fp16_768x768", |b| {
        b.iter(|| pack_fp16(black_box(&mut buf), black_box(&src), false, &info).unwrap())
    });

    let info = int8_pack_info(&Shape::new([k, n]), false).unwrap();
    let mut buf = vec![0u8; info.packsize as usize];
    group.bench_function("int8_768x768", |b| {
        b.iter(|| pack_int8(black_box(&mut buf), black_box(&src), false, k, n, info.packsize).unwrap())
    });
    group.finish();
}

fn bench_gemm(c: &mut Criterion) {
    let (k, n) = (768, 768);
    let fp16 = packed_fp16(k, n);
    let int8 = packed_int8(k, n);

    let mut group = c.benchmark_group("gemm");
    for m in [1, 8, 64] {
        let a = make_matrix(m * k);
        let mut out = vec![0.0f32; m * n];
        group.bench_function(format!("fp16_m={}_768x768", m), |b| {
            b.iter(|| gemm_fp16_packed(black_box(&mut out), black_box(&a), &fp16, None, m, n, false).unwrap())
        });
        group.bench_function(format!("int8_m={}_768x768", m), |b| {
            b.iter(|| gemm_int8_packed(black_box(&mut out), black_box(&a), &int8, m, n, k, false, false).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pack, bench_gemm);
criterion_main!(benches);
