// Family (home) endpoints
//
// Families group the devices bound to an account. Both the families the
// account created and those it was invited to are returned.

use serde_json::json;
use tracing::debug;

use crate::client::HaierClient;
use crate::error::Error;
use crate::models::{DataEnvelope, DeviceInfo, FamilyDevicesData, FamilyInfo, FamilyListData};

impl HaierClient {
    /// List all families visible to the account.
    ///
    /// `POST /api-gw/wisdomfamily/family/v4/family/list`
    pub async fn family_list(&self) -> Result<Vec<FamilyInfo>, Error> {
        let url = self.endpoints().family_list()?;
        let envelope: DataEnvelope<Option<FamilyListData>> = self.post(url, &json!({})).await?;
        let families = envelope.data.unwrap_or_default().into_families();
        debug!(count = families.len(), "fetched families");
        Ok(families)
    }

    /// List the devices bound to a family.
    ///
    /// `GET /api-gw/wisdomdevice/applent/device/v2/family/devices?familyId=`
    pub async fn devices_by_family_id(&self, family_id: &str) -> Result<Vec<DeviceInfo>, Error> {
        let url = self.endpoints().family_devices(family_id)?;
        let envelope: DataEnvelope<Option<FamilyDevicesData>> = self.get(url).await?;
        let devices = envelope.data.unwrap_or_default().deviceinfos;
        debug!(family_id, count = devices.len(), "fetched family devices");
        Ok(devices)
    }
}
