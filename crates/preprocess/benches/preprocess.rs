use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, RgbImage};
use preprocess::{ChannelScale, CodecConfig, TensorCodec, TensorLayout};
use std::io::Cursor;

/// Create a gradient frame so the JPEG encoder has real content to compress
fn create_test_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(create_test_frame(width, height))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .expect("Failed to encode benchmark frame");
    bytes
}

fn benchmark_encode_jpeg(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_jpeg");

    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];
    let target_side = 300;
    let codec = TensorCodec::default();

    for (width, height) in resolutions.iter() {
        let jpeg = create_test_jpeg(*width, *height);

        group.bench_with_input(
            BenchmarkId::new("nhwc_raw", format!("{}x{}", width, height)),
            &jpeg,
            |b, jpeg| {
                b.iter(|| {
                    let tensor = codec.encode(black_box(jpeg), target_side).unwrap();
                    black_box(tensor)
                })
            },
        );
    }

    group.finish();
}

fn benchmark_pack_layouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_layout");

    let frame = create_test_frame(1280, 720);
    let layouts = [
        ("nhwc_raw", TensorLayout::Nhwc, ChannelScale::Raw),
        ("nchw_unit", TensorLayout::Nchw, ChannelScale::UnitRange),
    ];

    for (name, layout, scale) in layouts {
        let codec = TensorCodec::new(CodecConfig { layout, scale });
        group.bench_function(name, |b| {
            b.iter(|| {
                let tensor = codec.encode_pixels(black_box(&frame), 640).unwrap();
                black_box(tensor)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encode_jpeg, benchmark_pack_layouts);
criterion_main!(benches);
