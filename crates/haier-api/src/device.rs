// Device endpoints: digital model snapshots and batch commands.

use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::HaierClient;
use crate::error::Error;
use crate::models::{BatchCommand, DigitalModelsResponse};

impl HaierClient {
    /// Fetch the digital models of one or more devices.
    ///
    /// Returns the raw `detailInfo` entries keyed by device id. Each value
    /// is either a JSON-encoded string or an object; devices the cloud does
    /// not know are simply absent.
    ///
    /// `POST /shadow/v1/devdigitalmodels`
    pub async fn dev_digital_models(
        &self,
        device_ids: &[&str],
    ) -> Result<IndexMap<String, Value>, Error> {
        let url = self.endpoints().digital_models()?;
        let list: Vec<Value> = device_ids
            .iter()
            .map(|id| json!({ "deviceId": id }))
            .collect();
        let resp: DigitalModelsResponse = self.post(url, &json!({ "deviceInfoList": list })).await?;
        debug!(requested = device_ids.len(), received = resp.detail_info.len(), "fetched digital models");
        Ok(resp.detail_info)
    }

    /// Send a batch of commands to one device over REST.
    ///
    /// `POST /stdudse/v1/sendbatchCmd/{deviceId}`
    pub async fn batch_send_command(
        &self,
        device_id: &str,
        command: &BatchCommand,
    ) -> Result<(), Error> {
        let url = self.endpoints().batch_command(device_id)?;
        let body = serde_json::to_value(command).map_err(|e| Error::Validation {
            message: format!("unserializable command: {e}"),
        })?;
        let _: Value = self.post(url, &body).await?;
        debug!(device_id, sn = %command.sn, "batch command accepted");
        Ok(())
    }
}
