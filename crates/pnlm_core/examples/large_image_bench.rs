use ndarray::Array2;
use pnlm_core::{EngineSelection, EnhanceRequest, Enhancer, PipelineParameters};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse::<T>().ok())
        .unwrap_or(default)
}

/// Smooth anatomy-like background with bright structures and shot-like noise.
fn build_radiograph(rows: usize, cols: usize) -> Array2<u16> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let noise = ((state >> 40) as f64) / ((1u64 << 24) as f64) - 0.5;
        let y = r as f64 / rows as f64;
        let x = c as f64 / cols as f64;
        let base = 12000.0 + 20000.0 * (1.0 - (x - 0.5).powi(2) - (y - 0.5).powi(2));
        let bone = if ((x * 7.0).fract() - 0.5).abs() < 0.05 { 15000.0 } else { 0.0 };
        let signal = base + bone;
        (signal + noise * 4.0 * signal.sqrt() * 10.0).clamp(0.0, 65535.0) as u16
    })
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|e| panic!("Invalid log filter: {}", e));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let rows = parse_arg(&args, "--rows", 2400usize);
    let cols = parse_arg(&args, "--cols", 3000usize);
    let runs = parse_arg(&args, "--runs", 1usize);
    let interactive = args.iter().any(|a| a == "--interactive");
    let exact = args.iter().any(|a| a == "--exact");

    let mut params = if interactive {
        PipelineParameters::interactive()
    } else {
        PipelineParameters::default()
    };
    if exact {
        params.engine = EngineSelection::ForceExact;
    }

    println!(
        "large image bench start rows={} cols={} runs={} preset={} engine={:?}",
        rows,
        cols,
        runs,
        if interactive { "interactive" } else { "default" },
        params.engine
    );

    let image = build_radiograph(rows, cols);
    let enhancer = Enhancer::new();
    let request = EnhanceRequest::new(params);

    for run in 0..runs {
        let mut last_progress = 0.0f32;
        let mut on_progress = |p: f32| last_progress = p;

        let t0 = Instant::now();
        let report = enhancer
            .enhance_detailed(image.view(), &request, Some(&mut on_progress), None)
            .unwrap_or_else(|e| panic!("enhancement failed: {}", e));
        let elapsed = t0.elapsed();

        // Keep output observable to avoid accidental optimization assumptions.
        let checksum: u64 = report
            .image
            .iter()
            .step_by((rows * cols / 4096).max(1))
            .map(|&v| v as u64)
            .sum();

        println!(
            "run={} tier={:?} engine={} elapsed_s={:.3} progress={:.2} checksum={} table_entries={}",
            run,
            report.tier,
            report.engine,
            elapsed.as_secs_f64(),
            last_progress,
            checksum,
            enhancer.distance_table().len()
        );
    }
}
