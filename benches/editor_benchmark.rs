//! Performance benchmarks for the page editor
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docdesk::editor::{
    AnnotationBody, CanvasError, Color, DocPoint, DocRect, DocumentPage, EditorConfig,
    EditorSession, PageCanvas, PageRaster, PixelPoint, Projector, StrokeLayer, StrokeMode,
};

/// Canvas that accepts everything and keeps nothing
struct NullCanvas;

impl PageCanvas for NullCanvas {
    fn draw_image(&mut self, encoded: &[u8], _rect: DocRect) -> Result<(), CanvasError> {
        black_box(encoded.len());
        Ok(())
    }

    fn draw_text(
        &mut self,
        text: &str,
        baseline: DocPoint,
        _font_size: f64,
        _color: Color,
    ) -> Result<(), CanvasError> {
        black_box((text.len(), baseline));
        Ok(())
    }
}

fn letter_page() -> DocumentPage {
    DocumentPage::new(612.0, 792.0).unwrap()
}

/// Zig-zag path across the raster, like a signature
fn signature_path(raster: &PageRaster, points: usize) -> Vec<PixelPoint> {
    let w = raster.pixel_width as f64;
    let h = raster.pixel_height as f64;
    (0..points)
        .map(|i| {
            let t = i as f64 / points as f64;
            PixelPoint::new(w * (0.1 + 0.8 * t), h * (0.5 + 0.1 * (t * 40.0).sin()))
        })
        .collect()
}

/// Benchmark raster to document projection
fn bench_projection(c: &mut Criterion) {
    let page = letter_page();
    let raster = PageRaster::for_page(&page, 1.5).unwrap();
    let projector = Projector::new(raster, page).unwrap();
    let points = signature_path(&raster, 1_000);

    c.bench_function("project_1000_points", |b| {
        b.iter(|| {
            for point in &points {
                black_box(projector.to_document(black_box(*point)));
            }
        });
    });
}

/// Benchmark painting strokes at different path lengths
fn bench_stroke_rendering(c: &mut Criterion) {
    let raster = PageRaster::for_page(&letter_page(), 1.5).unwrap();
    let mut group = c.benchmark_group("stroke_rendering");

    for points in [10usize, 100, 1_000] {
        let path = signature_path(&raster, points);
        group.bench_with_input(BenchmarkId::from_parameter(points), &path, |b, path| {
            let mut layer = StrokeLayer::new(&raster, 20).unwrap();
            b.iter(|| {
                layer.begin_stroke(path[0], StrokeMode::Draw, Color::BLACK, 3.0);
                for point in &path[1..] {
                    layer.continue_stroke(*point);
                }
                layer.end_stroke();
            });
        });
    }

    group.finish();
}

/// Benchmark a full burn-in: PNG-encoding the stroke layer plus annotations
fn bench_burn_in(c: &mut Criterion) {
    let mut session = EditorSession::new(EditorConfig::default());
    let (raster, _) = session.load_page(letter_page(), 1.5).unwrap();

    let path = signature_path(&raster, 200);
    session
        .begin_stroke(path[0], StrokeMode::Draw, Color::BLACK)
        .unwrap();
    for point in &path[1..] {
        session.continue_stroke(*point).unwrap();
    }
    session.end_stroke().unwrap();

    for i in 0..20 {
        session
            .add(
                PixelPoint::new(40.0, 40.0 + i as f64 * 30.0),
                AnnotationBody::Text {
                    content: format!("Line {}", i),
                    font_size: 16.0,
                    color: Color::BLACK,
                },
            )
            .unwrap();
    }

    c.bench_function("burn_in_letter_page", |b| {
        b.iter(|| black_box(session.burn_in(&mut NullCanvas).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_projection,
    bench_stroke_rendering,
    bench_burn_in
);
criterion_main!(benches);
