use criterion::{black_box, criterion_group, criterion_main, Criterion};
use skyrender::{
    draw_fft, draw_photons, draw_real_space, Exponential, Gaussian, ImageGrid, Moffat,
    PhotonCountPolicy, Profile, RadialSize, RenderOptions, Sersic, ShootOptions,
};

fn make_psf() -> Profile {
    Moffat::new(3.5, RadialSize::Fwhm(2.5), 1.0).unwrap().into()
}

fn make_galaxy() -> Profile {
    let bulge: Profile = Sersic::new(4.0, RadialSize::HalfLight(1.5), 400.0)
        .unwrap()
        .into();
    let disk: Profile = Exponential::new(RadialSize::HalfLight(4.0), 600.0)
        .unwrap()
        .into();
    let galaxy = Profile::sum(vec![bulge, disk])
        .unwrap()
        .shear(0.15, -0.05)
        .unwrap();
    Profile::convolve(vec![galaxy, make_psf()]).unwrap()
}

fn bench_draw_fft(c: &mut Criterion) {
    let galaxy = make_galaxy();
    let star: Profile = Gaussian::from_sigma(1.5, 1000.0).unwrap().into();
    let options = RenderOptions::default();

    let mut group = c.benchmark_group("draw_fft");
    group.bench_function("gaussian_64x64", |b| {
        let mut image = ImageGrid::<f64>::new(64, 64).unwrap();
        b.iter(|| draw_fft(black_box(&star), &mut image, black_box(&options)).unwrap())
    });
    group.bench_function("galaxy_psf_128x128", |b| {
        let mut image = ImageGrid::<f64>::new(128, 128).unwrap();
        b.iter(|| draw_fft(black_box(&galaxy), &mut image, black_box(&options)).unwrap())
    });
    group.finish();
}

fn bench_draw_photons(c: &mut Criterion) {
    let galaxy = make_galaxy();
    let options = RenderOptions::default();

    let mut group = c.benchmark_group("draw_photons");
    for count in [100_000usize, 1_000_000] {
        let shoot = ShootOptions {
            count: PhotonCountPolicy::Fixed(count),
            seed: Some(42),
            ..Default::default()
        };
        group.bench_function(format!("galaxy_psf_{count}"), |b| {
            let mut image = ImageGrid::<f64>::new(128, 128).unwrap();
            b.iter(|| draw_photons(black_box(&galaxy), &mut image, &options, &shoot).unwrap())
        });
    }
    group.finish();
}

fn bench_draw_real_space(c: &mut Criterion) {
    let star = Profile::from(Gaussian::from_sigma(1.5, 1000.0).unwrap())
        .shear(0.2, 0.0)
        .unwrap();
    let options = RenderOptions::default();

    c.bench_function("draw_real_space_32x32", |b| {
        let mut image = ImageGrid::<f64>::new(32, 32).unwrap();
        b.iter(|| draw_real_space(black_box(&star), &mut image, black_box(&options)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_draw_fft,
    bench_draw_photons,
    bench_draw_real_space,
);
criterion_main!(benches);
