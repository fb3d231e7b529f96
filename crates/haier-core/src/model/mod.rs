// ── Domain model ──

pub mod attribute;
pub mod digital_model;

pub use attribute::{Attribute, AttributeFlags, ListItem, StepRange, TemporalRange, ValueRange};
pub use digital_model::DigitalModel;
