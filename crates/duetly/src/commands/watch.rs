//! `duetly watch`: stream connector events until Ctrl-C.

use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use duetly_core::{Connector, ConnectorEvent, ObjectModel, job_percent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

fn describe(event: &ConnectorEvent, model: &ObjectModel, color: bool) -> String {
    match event {
        ConnectorEvent::ModelUpdated { sections } => {
            let status = output::paint_status(&model.state.status.to_string(), color);
            if model.job.is_active() && model.state.status.is_printing() {
                format!(
                    "[{status}] {} ({:.1}%)  changed: {}",
                    model.job.file.file_name.as_deref().unwrap_or("job"),
                    job_percent(model),
                    sections.join(", ")
                )
            } else {
                format!("[{status}] changed: {}", sections.join(", "))
            }
        }
        ConnectorEvent::ConnectionStateChanged { state } => format!("connection: {state:?}"),
        ConnectorEvent::FileTransferProgress {
            path, fraction, ..
        } => match fraction {
            Some(f) => format!("transfer {path}: {:.0}%", f * 100.0),
            None => format!("transfer {path}"),
        },
        ConnectorEvent::ReplyReceived { reply } => format!("reply: {}", reply.trim_end()),
        ConnectorEvent::JobFinished { file } => format!("job finished: {file}"),
        ConnectorEvent::VolumeChanged { index } => format!("volume {index} changed"),
        ConnectorEvent::LoginRequired { reason } => format!("login required: {reason}"),
    }
}

fn render(event: &ConnectorEvent, model: &ObjectModel, global: &GlobalOpts) -> Result<String, CliError> {
    Ok(match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(event)?,
        _ => describe(event, model, output::should_color(&global.color)),
    })
}

async fn watch_events(connector: &Connector, global: &GlobalOpts) -> Result<(), CliError> {
    let mut events = connector.subscribe();
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => event,
        };
        match event {
            Ok(event) => {
                let model = connector.snapshot();
                output::print_output(&render(&event, &model, global)?, global.quiet);
                if let ConnectorEvent::LoginRequired { reason } = event {
                    return Err(CliError::Controller {
                        code: "login".into(),
                        message: reason,
                    });
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

async fn watch_model(connector: &Connector, global: &GlobalOpts) -> Result<(), CliError> {
    let mut stream = connector.model_stream();
    loop {
        let snapshot = tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            snapshot = stream.changed() => snapshot,
        };
        let Some(model) = snapshot else {
            return Ok(());
        };
        output::print_output(&serde_json::to_string(&*model)?, global.quiet);
    }
}

pub async fn handle(args: WatchArgs, connector: &Connector, global: &GlobalOpts) -> Result<(), CliError> {
    if args.model {
        watch_model(connector, global).await
    } else {
        watch_events(connector, global).await
    }
}
