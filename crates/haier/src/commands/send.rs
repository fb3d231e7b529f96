//! `haier send <DEVICE_ID> NAME=VALUE...`: command a device.

use serde::Serialize;

use haier_core::{CommandArgs, Session};

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendSummary {
    device_id: String,
    route: String,
    args: CommandArgs,
}

/// Parse `name=value` pairs into one command map, keeping argument order.
pub fn parse_assignments(raw: &[String]) -> Result<CommandArgs, CliError> {
    let mut args = CommandArgs::new();
    for item in raw {
        let Some((name, value)) = item.split_once('=') else {
            return Err(CliError::Validation {
                field: "assignment".into(),
                reason: format!("expected NAME=VALUE, got '{item}'"),
            });
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::Validation {
                field: "assignment".into(),
                reason: format!("missing attribute name in '{item}'"),
            });
        }
        args.insert(name.to_owned(), value.to_owned());
    }
    Ok(args)
}

pub async fn handle(session: &Session, args: &SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = parse_assignments(&args.assignments)?;

    if args.live {
        if let Err(e) = session.connect().await {
            tracing::warn!(error = %e, "live channel unavailable, sending over REST");
        }
    }
    let sent = session
        .send_commands(&args.device_id, std::slice::from_ref(&command))
        .await;
    if args.live {
        session.disconnect().await;
    }
    let route = sent?;

    let summary = SendSummary {
        device_id: args.device_id.clone(),
        route: route.to_string(),
        args: command,
    };
    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &summary,
        |s| {
            format!(
                "Sent {} attribute(s) to {} {}",
                s.args.len(),
                output::accent(&s.device_id, color),
                output::dim(&format!("via {}", s.route), color),
            )
        },
        |s| s.route.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
