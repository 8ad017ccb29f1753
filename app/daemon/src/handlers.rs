//! The registered job handlers.
//!
//! Single-cell and circuit jobs decompose into one worker process per
//! stimulus amplitude or input frequency and run through the fan-out
//! executor; synapse placement and mesh analysis run in-process. All
//! four relay their output onto the job's channel.

use crate::sim;
use acore::JobKind;
use anyhow::{Context, Result, bail};
use fanout::{ChildCommand, FanoutEvent, FanoutSpec};
use queue::{JobContext, Registry};
use serde_json::{Value, json};
use std::time::Duration;

/// How long cancelled children get to wind down before a forced kill.
const CHILD_GRACE: Duration = Duration::from_secs(2);

/// Every job kind, statically registered. The runner validates
/// coverage before taking work.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(JobKind::SingleCell, single_cell);
    registry.register(JobKind::Circuit, circuit);
    registry.register(JobKind::SynapsePlacement, synapse_placement);
    registry.register(JobKind::MeshAnalysis, mesh_analysis);
    registry
}

/// Entrypoint for the hidden `fanout-child` subcommand: one parameter
/// set in on stdin, result records out on stdout.
pub async fn run_fanout_child(kind: JobKind) -> Result<()> {
    fanout::run_child(move |task, sink, stop| async move {
        let payload = sim::run_parameter_set(kind, &task.params, &stop)?;
        sink.payload(payload);
        Ok(())
    })
    .await
}

/// Membrane response per stimulus amplitude, one child each.
async fn single_cell(ctx: JobContext) -> Result<()> {
    let amplitudes = f64_list(&ctx.args, "amplitudes", &[0.05, 0.1, 0.2, 0.4]);
    let sets = amplitudes
        .into_iter()
        .map(|a| json!({ "amplitude": a }))
        .collect();
    fan_out(ctx, sets, "voltage_trace").await
}

/// Population rate response per input frequency, one child each.
async fn circuit(ctx: JobContext) -> Result<()> {
    let frequencies = f64_list(&ctx.args, "frequencies", &[1.0, 5.0, 10.0, 20.0]);
    let sets = frequencies
        .into_iter()
        .map(|f| json!({ "frequency": f }))
        .collect();
    fan_out(ctx, sets, "rate_series").await
}

async fn synapse_placement(ctx: JobContext) -> Result<()> {
    let count = ctx.args["count"].as_u64().unwrap_or(200) as usize;
    let sections = ctx.args["sections"].as_u64().unwrap_or(16) as usize;
    let placements = sim::place_synapses(count, sections, &ctx.stop)?;
    ctx.producer
        .send_data(placements, Some("synapse_placement".to_owned()))?;
    Ok(())
}

async fn mesh_analysis(ctx: JobContext) -> Result<()> {
    let vertices = ctx.args["vertices"].as_u64().unwrap_or(4096) as usize;
    let summary = sim::mesh_summary(vertices, &ctx.stop)?;
    ctx.producer
        .send_data(summary, Some("mesh_summary".to_owned()))?;
    Ok(())
}

/// Run one fan-out, relaying payloads onto the job's channel as they
/// arrive. The first child error fails the whole job; its detail ends
/// up in the terminal status.
async fn fan_out(ctx: JobContext, parameter_sets: Vec<Value>, content_type: &str) -> Result<()> {
    let spec = FanoutSpec {
        command: child_command(ctx.kind)?,
        parameter_sets,
        pool_cap: ctx.config.pool_size_cap,
        stop: ctx.stop.clone(),
        grace: CHILD_GRACE,
        poll_interval: ctx.config.poll_interval(),
    };

    let producer = &ctx.producer;
    let mut failure: Option<String> = None;
    let summary = fanout::run(spec, |event| match event {
        FanoutEvent::Payload { payload, .. } => {
            if let Err(e) = producer.send_data(payload, Some(content_type.to_owned())) {
                tracing::warn!("relaying fan-out payload: {e}");
            }
        }
        FanoutEvent::Error {
            task_id,
            kind,
            message,
        } => {
            failure.get_or_insert(format!("parameter set {task_id} ({kind}): {message}"));
        }
    })
    .await?;

    if let Some(detail) = failure {
        bail!(detail);
    }
    if summary.cancelled {
        bail!("cancelled by caller");
    }
    Ok(())
}

/// Children are re-executions of this binary with the hidden child
/// entrypoint.
fn child_command(kind: JobKind) -> Result<ChildCommand> {
    let program = std::env::current_exe().context("resolve current executable")?;
    Ok(ChildCommand {
        program,
        args: vec!["fanout-child".to_owned(), kind.as_str().to_owned()],
    })
}

fn f64_list(args: &Value, field: &str, default: &[f64]) -> Vec<f64> {
    args[field]
        .as_array()
        .map(|values| values.iter().filter_map(Value::as_f64).collect())
        .filter(|values: &Vec<f64>| !values.is_empty())
        .unwrap_or_else(|| default.to_vec())
}
