//! `haier login`: force a password login and persist the token.

use chrono::{DateTime, Utc};
use serde::Serialize;

use haier_core::Session;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginSummary {
    username: String,
    user_id: String,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
}

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let token = session.login().await?;
    let summary = LoginSummary {
        username: session.config().credentials.username.clone(),
        user_id: token.uhome_user_id.clone(),
        token_type: token.token_type.clone(),
        expires_at: DateTime::from_timestamp_millis(token.expires_at),
    };

    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &summary,
        |s| {
            let expiry = s
                .expires_at
                .map_or_else(|| "unknown".to_owned(), |at| at.to_rfc3339());
            format!(
                "Logged in as {} {}",
                output::accent(&s.username, color),
                output::dim(&format!("(token expires {expiry})"), color),
            )
        },
        |s| s.user_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
