//! `haier families`: list the homes on the account.

use tabled::Tabled;

use haier_core::{FamilyInfo, Session};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct FamilyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&FamilyInfo> for FamilyRow {
    fn from(f: &FamilyInfo) -> Self {
        Self {
            id: f.family_id.clone(),
            name: f.family_name.clone(),
        }
    }
}

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let families = session.family_list().await?;
    let out = output::render_list(global.output, &families, |f| FamilyRow::from(f), |f| {
        f.family_id.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
