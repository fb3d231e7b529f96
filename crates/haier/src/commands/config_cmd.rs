//! Config subcommand handlers.

use std::io::IsTerminal;

use haier_config::{Config, PASSWORD_ENV, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&haier_config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        // Falls back to defaults so a fresh install can inspect the layout.
        ConfigCommand::Show => {
            let mut cfg = haier_config::load_config_or_default();
            redact(&mut cfg);
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("<unrenderable: {e}>")),
                |c| {
                    let mut names: Vec<&str> = c.profiles.keys().map(String::as_str).collect();
                    names.sort_unstable();
                    names.join("\n")
                },
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init(init) => init_profile(init, global),
    }
}

fn init_profile(args: InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.username.trim().is_empty() {
        return Err(CliError::Validation {
            field: "username".into(),
            reason: "username cannot be empty".into(),
        });
    }

    let mut cfg = haier_config::load_config()?;
    if cfg.profiles.contains_key(&args.name) && !args.force {
        return Err(CliError::Validation {
            field: "name".into(),
            reason: format!("profile '{}' already exists, pass --force to replace it", args.name),
        });
    }

    let password = if args.password_env.is_some() {
        None
    } else {
        prompt_password()?
    };

    let profile = Profile {
        username: Some(args.username),
        password,
        password_env: args.password_env,
        storage_dir: args.storage_dir,
        ..Profile::default()
    };
    if cfg.profiles.is_empty() {
        cfg.default_profile = Some(args.name.clone());
    }
    cfg.profiles.insert(args.name.clone(), profile);
    haier_config::save_config(&cfg)?;

    if !global.quiet {
        let color = output::should_color(global.color);
        eprintln!(
            "Profile {} written to {}",
            output::accent(&args.name, color),
            haier_config::config_path().display()
        );
    }
    Ok(())
}

/// Ask for a password on an interactive terminal. Empty input, or no
/// terminal at all, leaves the password to `HAIER_PASSWORD` at run time.
fn prompt_password() -> Result<Option<String>, CliError> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let entered = rpassword::prompt_password(format!(
        "Password (stored in plaintext; leave empty to use {PASSWORD_ENV}): "
    ))?;
    Ok(Some(entered).filter(|pw| !pw.is_empty()))
}

fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(REDACTED.into());
        }
    }
}
