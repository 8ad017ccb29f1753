//! Synthetic stand-ins for the external simulation engine.
//!
//! The real service delegates these computations to an opaque
//! collaborator; what matters here is that they are compute-shaped:
//! they iterate, they take a while on large inputs, and they check
//! the stop signal at the top of each iteration chunk so cooperative
//! cancellation has somewhere to land.

use acore::{JobKind, StopSignal};
use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

const V_REST_MV: f64 = -65.0;
const SPIKE_THRESHOLD_MV: f64 = -50.0;
const MEMBRANE_TAU_MS: f64 = 20.0;
const INPUT_RESISTANCE_MOHM: f64 = 150.0;

const RATE_MAX_HZ: f64 = 80.0;
const RATE_HALF_HZ: f64 = 8.0;
const ADAPT_TAU_S: f64 = 0.5;

/// Dispatch for fan-out children: exactly one parameter set, one
/// payload back.
pub fn run_parameter_set(kind: JobKind, params: &Value, stop: &StopSignal) -> Result<Value> {
    match kind {
        JobKind::SingleCell => {
            let amplitude = params["amplitude"]
                .as_f64()
                .context("parameter set is missing an amplitude")?;
            cell_trace(amplitude, stop)
        }
        JobKind::Circuit => {
            let frequency = params["frequency"]
                .as_f64()
                .context("parameter set is missing a frequency")?;
            circuit_rates(frequency, stop)
        }
        other => bail!("{other} does not fan out"),
    }
}

/// Integrate-and-fire response of one cell to a 300 ms current step,
/// downsampled tenfold for the wire.
pub fn cell_trace(amplitude_na: f64, stop: &StopSignal) -> Result<Value> {
    let dt_ms = 0.1;
    let steps = 4000;
    let mut v = V_REST_MV;
    let mut spikes = 0u32;
    let mut t_ms = Vec::with_capacity(steps / 10);
    let mut v_mv = Vec::with_capacity(steps / 10);

    for step in 0..steps {
        if step % 100 == 0 && stop.is_set() {
            bail!("cancelled");
        }
        let t = step as f64 * dt_ms;
        let current = if (50.0..350.0).contains(&t) {
            amplitude_na
        } else {
            0.0
        };
        v += dt_ms / MEMBRANE_TAU_MS * (-(v - V_REST_MV) + INPUT_RESISTANCE_MOHM * current);
        if v >= SPIKE_THRESHOLD_MV {
            spikes += 1;
            v = V_REST_MV;
        }
        if step % 10 == 0 {
            t_ms.push(round3(t));
            v_mv.push(round3(v));
        }
    }

    Ok(json!({
        "amplitude_na": amplitude_na,
        "dt_ms": dt_ms * 10.0,
        "spike_count": spikes,
        "t_ms": t_ms,
        "v_mv": v_mv,
    }))
}

/// Population rate of a circuit driven at one synaptic input
/// frequency, with slow adaptation, in 10 ms bins.
pub fn circuit_rates(frequency_hz: f64, stop: &StopSignal) -> Result<Value> {
    let bin_s = 0.01;
    let bins = 200;
    let drive = RATE_MAX_HZ * frequency_hz / (frequency_hz + RATE_HALF_HZ);
    let mut adaptation = 0.0;
    let mut rate_hz = Vec::with_capacity(bins);

    for bin in 0..bins {
        if bin % 50 == 0 && stop.is_set() {
            bail!("cancelled");
        }
        let rate = (drive - adaptation).max(0.0);
        adaptation += bin_s / ADAPT_TAU_S * (0.3 * rate - adaptation);
        rate_hz.push(round3(rate));
    }

    Ok(json!({
        "frequency_hz": frequency_hz,
        "bin_s": bin_s,
        "rate_hz": rate_hz,
    }))
}

/// Deterministic low-discrepancy placement of synapses across a
/// morphology's sections: golden-ratio stepping gives an even spread
/// without an RNG, so placements are reproducible run to run.
pub fn place_synapses(count: usize, sections: usize, stop: &StopSignal) -> Result<Value> {
    const GOLDEN: f64 = 0.618_033_988_749_895;
    if sections == 0 {
        bail!("morphology has no sections");
    }

    let mut placements = Vec::with_capacity(count);
    let mut u = 0.5;
    for i in 0..count {
        if i % 64 == 0 && stop.is_set() {
            bail!("cancelled");
        }
        u = (u + GOLDEN).fract();
        let scaled = u * sections as f64;
        placements.push(json!({
            "section": scaled as usize,
            "offset": round3(scaled.fract()),
        }));
    }

    Ok(json!({
        "count": count,
        "sections": sections,
        "placements": placements,
    }))
}

/// Spacing statistics over a Fibonacci sampling of the mesh surface —
/// a cheap proxy for the triangle-quality checks the real analyzer
/// runs.
pub fn mesh_summary(vertices: usize, stop: &StopSignal) -> Result<Value> {
    if vertices < 2 {
        bail!("mesh needs at least two vertices");
    }

    let mut prev: Option<[f64; 3]> = None;
    let mut total = 0.0;
    let mut min = f64::MAX;
    let mut max: f64 = 0.0;
    for i in 0..vertices {
        if i % 256 == 0 && stop.is_set() {
            bail!("cancelled");
        }
        let point = fibonacci_point(i, vertices);
        if let Some(p) = prev {
            let d = dist(p, point);
            total += d;
            min = min.min(d);
            max = max.max(d);
        }
        prev = Some(point);
    }

    Ok(json!({
        "vertices": vertices,
        "mean_spacing": round3(total / (vertices - 1) as f64),
        "min_spacing": round3(min),
        "max_spacing": round3(max),
    }))
}

/// The i-th of n points on a unit sphere, evenly spread.
fn fibonacci_point(i: usize, n: usize) -> [f64; 3] {
    const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
    let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
    let r = (1.0 - z * z).sqrt();
    let phi = GOLDEN_ANGLE * i as f64;
    [r * phi.cos(), r * phi.sin(), z]
}

fn dist(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
