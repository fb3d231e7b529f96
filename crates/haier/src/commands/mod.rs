//! Command dispatch: bridges CLI args to session calls and output formatting.

pub mod config_cmd;
pub mod devices;
pub mod families;
pub mod login;
pub mod model;
pub mod send;
pub mod watch;

use haier_core::Session;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Reject malformed arguments before any config or network work happens.
pub fn precheck(cmd: &Command) -> Result<(), CliError> {
    match cmd {
        Command::Send(args) => send::parse_assignments(&args.assignments).map(drop),
        _ => Ok(()),
    }
}

/// Dispatch a session-bound command to its handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login => login::handle(session, global).await,
        Command::Families => families::handle(session, global).await,
        Command::Devices(args) => devices::handle(session, &args, global).await,
        Command::Model(args) => model::handle(session, &args, global).await,
        Command::Send(args) => send::handle(session, &args, global).await,
        Command::Watch(args) => watch::handle(session, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
