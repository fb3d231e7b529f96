//! `haier model <DEVICE_ID>`: show a device's digital model.

use tabled::Tabled;

use haier_core::{Attribute, DigitalModel, Session, ValueRange};

use crate::cli::{GlobalOpts, ModelArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Access")]
    access: &'static str,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Attribute> for AttributeRow {
    fn from(a: &Attribute) -> Self {
        Self {
            name: a.name.clone(),
            value: a.effective_value().unwrap_or("-").to_owned(),
            access: access_label(a),
            range: range_summary(&a.value_range),
            description: a.description.clone(),
        }
    }
}

fn access_label(a: &Attribute) -> &'static str {
    match (a.flags.readable, a.flags.writable) {
        (true, true) => "rw",
        (true, false) => "r",
        (false, true) => "w",
        (false, false) => "-",
    }
}

/// One-line description of an attribute's allowed values.
pub(crate) fn range_summary(range: &ValueRange) -> String {
    match range {
        ValueRange::Step { data_step } => format!(
            "{}..{} step {}",
            data_step.min_value, data_step.max_value, data_step.step
        ),
        ValueRange::List { data_list } => data_list
            .iter()
            .map(|item| item.data.as_str())
            .collect::<Vec<_>>()
            .join("|"),
        ValueRange::Date { data_date: bounds } | ValueRange::Time { data_time: bounds } => {
            let lo = bounds.min_value.as_deref().unwrap_or("");
            let hi = bounds.max_value.as_deref().unwrap_or("");
            match &bounds.format {
                Some(format) => format!("{format} {lo}..{hi}"),
                None => format!("{lo}..{hi}"),
            }
        }
    }
}

fn render_detail(model: &DigitalModel) -> String {
    let rows: Vec<AttributeRow> = model
        .attributes
        .iter()
        .filter(|a| !a.flags.invisible)
        .map(AttributeRow::from)
        .collect();
    let mut out = output::render_table(&rows);
    if !model.alarms.is_empty() {
        out.push_str(&format!("\n{} active alarm(s)", model.alarms.len()));
    }
    out
}

fn render_assignments(model: &DigitalModel) -> String {
    model
        .attributes
        .iter()
        .map(|a| format!("{}={}", a.name, a.effective_value().unwrap_or("")))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn handle(session: &Session, args: &ModelArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let model = session
        .get_dev_digital_model(&args.device_id, args.refresh)
        .await?;
    let out = output::render_single(global.output, model.as_ref(), render_detail, render_assignments);
    output::print_output(&out, global.quiet);
    Ok(())
}
