//! `haier devices <FAMILY_ID>`: list devices bound to a family.

use tabled::Tabled;

use haier_core::{DeviceInfo, Session};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Online")]
    online: String,
}

impl From<&DeviceInfo> for DeviceRow {
    fn from(d: &DeviceInfo) -> Self {
        let online = match d.base_info.is_online {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        Self {
            id: d.device_id().to_owned(),
            name: d.display_name().to_owned(),
            kind: d.base_info.device_type.clone().unwrap_or_else(|| "-".into()),
            online: online.into(),
        }
    }
}

pub async fn handle(
    session: &Session,
    args: &DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let devices = session.devices_by_family_id(&args.family_id).await?;
    let out = output::render_list(global.output, &devices, |d| DeviceRow::from(d), |d| {
        d.device_id().to_owned()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
