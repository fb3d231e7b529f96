//! Translation from the TOML profiles to a `SessionConfig`.
//!
//! Core never sees profile types; it receives a pre-built `SessionConfig`.

use haier_config::{Config, Profile};
use haier_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Profile selected by `--profile`, then `default_profile`, then `default`.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `SessionConfig` from the config file, profile, and CLI overrides.
///
/// With no config file at all, a session can still be built from
/// `HAIER_USERNAME` and `HAIER_PASSWORD` alone.
pub fn build_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = haier_config::load_config()?;
    let name = active_profile_name(global, &cfg);

    let mut session = match cfg.profiles.get(&name) {
        Some(profile) => haier_config::profile_to_session_config(profile, &name, &cfg.defaults)?,
        None if cfg.profiles.is_empty() => {
            haier_config::profile_to_session_config(&Profile::default(), &name, &cfg.defaults)
                .map_err(|_| CliError::NoConfig {
                    path: haier_config::config_path().display().to_string(),
                })?
        }
        None => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: available.join(", "),
            });
        }
    };

    if let Some(dir) = &global.storage_dir {
        session.storage_dir.clone_from(dir);
    }
    Ok(session)
}
