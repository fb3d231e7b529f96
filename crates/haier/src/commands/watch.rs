//! `haier watch <DEVICE_ID>...`: stream live model updates.

use std::collections::HashSet;

use chrono::Local;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use haier_core::{ConnectionStatus, DigitalModel, Session, SessionEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRecord<'a> {
    device_id: &'a str,
    model: &'a DigitalModel,
}

pub async fn handle(session: &Session, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut events = session.events();
    let mut status = session.connection_status();

    session.connect().await?;
    if let Err(e) = session.subscribe_devices(args.device_ids.iter().cloned()).await {
        session.disconnect().await;
        return Err(e.into());
    }

    let watched: HashSet<&str> = args.device_ids.iter().map(String::as_str).collect();
    let color = output::should_color(global.color);
    if !global.quiet {
        eprintln!(
            "{}",
            output::dim(
                &format!("Watching {} device(s), Ctrl-C to stop", watched.len()),
                color
            )
        );
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            event = events.recv() => match event {
                Ok(SessionEvent::DevDigitalModelUpdate { device_id, model }) => {
                    if watched.contains(device_id.as_str()) {
                        let line = render_update(global.output, &device_id, &model, color);
                        output::print_output(&line, global.quiet);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind, some updates were dropped");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *status.borrow_and_update();
                if !global.quiet {
                    eprintln!("{}", output::dim(&format!("channel {current:?}"), color));
                }
                if current == ConnectionStatus::Disconnected && gave_up(session) {
                    break Err(CliError::ConnectionFailed {
                        reason: "live channel lost and the reconnect limit was reached".into(),
                    });
                }
            }
        }
    };

    session.disconnect().await;
    outcome
}

/// Whether the supervisor has stopped retrying.
fn gave_up(session: &Session) -> bool {
    let state = session.state();
    state.status == ConnectionStatus::Disconnected
        && state.reconnect_attempts >= session.config().reconnect.max_attempts
}

fn render_update(format: OutputFormat, device_id: &str, model: &DigitalModel, color: bool) -> String {
    let record = UpdateRecord { device_id, model };
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(&record, true),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(&record)),
        OutputFormat::Table | OutputFormat::Plain => {
            let values = model
                .attributes
                .iter()
                .filter(|a| !a.flags.invisible)
                .filter_map(|a| a.effective_value().map(|v| format!("{}={v}", a.name)))
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "{} {} {values}",
                output::dim(&Local::now().format("%H:%M:%S").to_string(), color),
                output::accent(device_id, color),
            )
        }
    }
}
