//! Benchmarks for whole-document tile encoding and decoding, sequential vs parallel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use xcf_rs::{
    decode_bytes, decode_with, encode_to_vec, ColorMode, DecodeOptions, Document, EncodeOptions,
    LayerNode, PixelLayout, Raster,
};

fn photo(size: u32) -> Document {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut data = Vec::with_capacity(size as usize * size as usize * 3);
    for y in 0..size {
        for x in 0..size {
            let noise: u8 = rng.gen_range(0..16);
            data.push((x as u8).wrapping_add(noise));
            data.push((y as u8).wrapping_add(noise));
            data.push(((x ^ y) as u8) & 0xF0);
        }
    }
    let raster = Raster::from_pixels(size, size, PixelLayout::Rgb, data).unwrap();
    Document::new(size, size, ColorMode::Rgb).with_layer(LayerNode::image("photo", raster))
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_encode");
    group.sample_size(20);

    for size in [256u32, 1024] {
        let doc = photo(size);
        group.throughput(Throughput::Bytes(u64::from(size) * u64::from(size) * 3));

        let sequential = EncodeOptions {
            parallel_tiles: false,
            ..EncodeOptions::rle()
        };
        group.bench_with_input(BenchmarkId::new("sequential", size), &doc, |b, doc| {
            b.iter(|| encode_to_vec(black_box(doc), sequential.clone()).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), &doc, |b, doc| {
            b.iter(|| encode_to_vec(black_box(doc), EncodeOptions::rle()).unwrap());
        });
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_decode");
    group.sample_size(20);

    for size in [256u32, 1024] {
        let bytes = encode_to_vec(&photo(size), EncodeOptions::rle()).unwrap();
        group.throughput(Throughput::Bytes(u64::from(size) * u64::from(size) * 3));

        group.bench_with_input(BenchmarkId::new("sequential", size), &bytes, |b, bytes| {
            b.iter(|| {
                decode_with(std::io::Cursor::new(black_box(bytes)), DecodeOptions::sequential())
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), &bytes, |b, bytes| {
            b.iter(|| decode_bytes(black_box(bytes)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_decode);
criterion_main!(benches);
