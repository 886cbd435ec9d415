//! `duetly status`: one snapshot of the synced model.

use std::fmt::Write;
use std::time::Duration;

use serde::Serialize;

use duetly_core::{Connector, ObjectModel, job_percent};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StatusView {
    name: String,
    firmware: Option<String>,
    protocol: Option<String>,
    status: String,
    up_time_secs: i64,
    current_tool: i64,
    heaters: Vec<HeaterView>,
    job: Option<JobView>,
}

#[derive(Debug, Serialize)]
struct HeaterView {
    index: usize,
    current: f64,
    active: f64,
    standby: f64,
    state: String,
}

#[derive(Debug, Serialize)]
struct JobView {
    file: String,
    percent: f64,
    layer: Option<i64>,
    elapsed_secs: Option<f64>,
}

fn view(connector: &Connector, model: &ObjectModel) -> StatusView {
    let heaters = model
        .heat
        .heaters
        .iter()
        .enumerate()
        .filter_map(|(index, heater)| {
            heater.as_ref().map(|h| HeaterView {
                index,
                current: h.current,
                active: h.active,
                standby: h.standby,
                state: h.state.to_string(),
            })
        })
        .collect();

    let printing = model.job.is_active() && model.state.status.is_printing();
    let job = printing.then(|| JobView {
        file: model.job.file.file_name.clone().unwrap_or_default(),
        percent: job_percent(model),
        layer: model.job.layer,
        elapsed_secs: model.job.duration,
    });

    let firmware = model
        .boards
        .first()
        .filter(|b| !b.firmware_name.is_empty())
        .map(|b| format!("{} {}", b.firmware_name, b.firmware_version));

    StatusView {
        name: model.network.name.clone(),
        firmware,
        protocol: connector.variant().map(|v| v.to_string()),
        status: model.state.status.to_string(),
        up_time_secs: model.state.up_time,
        current_tool: model.state.current_tool,
        heaters,
        job,
    }
}

fn detail(view: &StatusView, color: bool) -> String {
    let mut out = String::new();
    let name = if view.name.is_empty() { "(unnamed)" } else { &view.name };
    let _ = writeln!(out, "Machine:   {name}");
    if let Some(ref firmware) = view.firmware {
        let _ = writeln!(out, "Firmware:  {firmware}");
    }
    if let Some(ref protocol) = view.protocol {
        let _ = writeln!(out, "Protocol:  {protocol}");
    }
    let _ = writeln!(
        out,
        "Status:    {}",
        output::paint_status(&view.status, color)
    );
    let up_time = Duration::from_secs(u64::try_from(view.up_time_secs).unwrap_or(0));
    let _ = writeln!(out, "Uptime:    {}", humantime::format_duration(up_time));
    if view.current_tool >= 0 {
        let _ = writeln!(out, "Tool:      T{}", view.current_tool);
    }

    if !view.heaters.is_empty() {
        let _ = writeln!(out, "\nHeaters:");
        for h in &view.heaters {
            let _ = writeln!(
                out,
                "  {:>2}  {:>6.1} °C  (active {:.0} / standby {:.0})  {}",
                h.index, h.current, h.active, h.standby, h.state
            );
        }
    }

    if let Some(ref job) = view.job {
        let _ = writeln!(out, "\nJob:       {}", job.file);
        let _ = writeln!(out, "Progress:  {:.1}%", job.percent);
        if let Some(layer) = job.layer {
            let _ = writeln!(out, "Layer:     {layer}");
        }
    }
    out.trim_end().to_owned()
}

pub fn handle(connector: &Connector, global: &GlobalOpts) -> Result<(), CliError> {
    let model = connector.snapshot();
    let view = view(connector, &model);
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &view,
        |v| detail(v, color),
        |v| v.status.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
