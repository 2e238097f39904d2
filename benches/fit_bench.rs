use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use std::time::Duration;

use qpd_lock::fit::{new_fit_lock, GaussianFitter, MomentFitter, SpotFitter};
use qpd_lock::frame::Frame;

fn two_spot_frame(size: usize, sigma: f64) -> Frame {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let row0 = (size / 2) as f64;
    let cols = [0.25 * size as f64, 0.75 * size as f64];
    let pixels = Array2::from_shape_fn((size, size), |(r, c)| {
        let dr = r as f64 - row0;
        cols.iter()
            .map(|&c0| {
                let dc = c as f64 - c0;
                200.0 * (-(dr * dr + dc * dc) / two_sigma_sq).exp()
            })
            .sum::<f64>()
            .round() as u16
    });
    Frame::new(0, pixels)
}

fn benchmark_gaussian_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian_do_fit");
    for sigma in [3.0, 5.0, 8.0] {
        let frame = two_spot_frame(200, sigma);
        let fitter = GaussianFitter::new(sigma, new_fit_lock());
        group.bench_with_input(BenchmarkId::from_parameter(sigma), &frame, |b, frame| {
            b.iter(|| black_box(fitter.do_fit(frame)));
        });
    }
    group.finish();
}

fn benchmark_moment_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("moments_do_fit");
    let fitter = MomentFitter::new().with_throttle(Duration::ZERO);
    for size in [100, 200, 400] {
        let frame = two_spot_frame(size, 5.0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(fitter.do_fit(frame)));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_gaussian_fit, benchmark_moment_fit);
criterion_main!(benches);
