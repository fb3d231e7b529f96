// ── Command dispatch ──
//
// Commands prefer the live channel and fall back to REST. After delivery
// the cached model is patched with the requested values; there is no
// reconciliation if the device later rejects the command, so the cache may
// briefly show a value the device never took until the next push or fetch.

use haier_api::sign::{now_millis, sequence_id};
use haier_api::{BatchCommand, CmdMsg, CommandArgs, Envelope};
use tracing::{debug, info, warn};

use super::{ConnectionStatus, Session};
use crate::error::CoreError;

/// Which path delivered a command batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CommandRoute {
    LiveChannel,
    Rest,
}

impl Session {
    /// Send one or more attribute maps to a device.
    ///
    /// Only a failure of the REST fallback is returned as an error; a
    /// failed live-channel send is logged and retried over REST.
    pub async fn send_commands(
        &self,
        device_id: &str,
        commands: &[CommandArgs],
    ) -> Result<CommandRoute, CoreError> {
        validate(device_id, commands)?;

        let sn = sequence_id(now_millis());
        let messages = CmdMsg::batch(device_id, &sn, commands);

        let mut route = CommandRoute::Rest;
        let open = *self.inner.status.borrow() == ConnectionStatus::Open;
        if open {
            let trace = uuid::Uuid::new_v4().to_string();
            match self.send(&Envelope::batch_cmd(&trace, &sn, &messages)).await {
                Ok(()) => route = CommandRoute::LiveChannel,
                Err(e) => warn!(device_id, %sn, error = %e, "live channel send failed, using REST"),
            }
        }

        if route == CommandRoute::Rest {
            let batch = BatchCommand {
                sn: sn.clone(),
                cmd_msg_list: messages,
            };
            self.inner.client.batch_send_command(device_id, &batch).await?;
        }
        info!(device_id, %sn, %route, count = commands.len(), "commands sent");

        self.apply_optimistic(device_id, commands);
        Ok(route)
    }

    /// Write the commanded values into the cached model, if there is one.
    fn apply_optimistic(&self, device_id: &str, commands: &[CommandArgs]) {
        let updated = self.inner.cache.update(device_id, |model| {
            for (name, value) in commands.iter().flatten() {
                if !model.set_value(name, value) {
                    debug!(device_id, attribute = %name, "commanded attribute not in model");
                }
            }
        });
        match updated {
            Some(model) => self.inner.publish_model(device_id, model),
            None => debug!(device_id, "no cached model to update"),
        }
    }
}

fn validate(device_id: &str, commands: &[CommandArgs]) -> Result<(), CoreError> {
    let invalid = |message: &str| {
        Err(CoreError::ValidationFailed {
            message: message.to_owned(),
        })
    };
    if device_id.trim().is_empty() {
        return invalid("device id must be non-empty");
    }
    if commands.is_empty() {
        return invalid("at least one command is required");
    }
    if commands.iter().any(CommandArgs::is_empty) {
        return invalid("each command needs at least one attribute");
    }
    if commands.iter().flatten().any(|(name, _)| name.trim().is_empty()) {
        return invalid("attribute names must be non-empty");
    }
    Ok(())
}
