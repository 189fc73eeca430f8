use std::env;

use petsync_core::config::ENV_API_BASE_URL;
use petsync_core::util::normalize_text_option;
use petsync_core::SyncConfig;
use uuid::Uuid;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            device_id,
            push_interval_secs,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileInput {
                api_base_url,
                device_id,
                push_interval_secs,
            },
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, json),
    }
}

/// Values passed to `config init`
#[derive(Debug, Default)]
pub struct ProfileInput {
    pub api_base_url: Option<String>,
    pub device_id: Option<String>,
    pub push_interval_secs: Option<u64>,
}

pub fn run_config_init(
    profile_name: Option<&str>,
    input: ProfileInput,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let profile = merge_profile(
        &existing,
        input,
        normalize_text_option(env::var(ENV_API_BASE_URL).ok()),
    );
    profile.validate().map_err(CliError::Config)?;
    *config.profile_mut_or_default(&profile_name) = profile;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Profile '{}' initialized at {}", profile_name, path.display());

    if config
        .profile(&profile_name)
        .and_then(|profile| profile.api_base_url.as_ref())
        .is_none()
    {
        println!("Profile '{profile_name}' is missing: api_base_url");
    } else {
        println!("Profile '{profile_name}' is ready. Run `petsync auth login --token <TOKEN>`.");
    }
    Ok(())
}

/// Explicit input, then environment, then stored values; a device id is
/// generated once and then kept.
pub fn merge_profile(
    existing: &CliProfile,
    input: ProfileInput,
    env_api_base_url: Option<String>,
) -> CliProfile {
    let api_base_url = normalize_text_option(input.api_base_url)
        .or(env_api_base_url)
        .or_else(|| existing.api_base_url.clone())
        .map(|url| url.trim_end_matches('/').to_string());
    let device_id = normalize_text_option(input.device_id)
        .or_else(|| existing.device_id.clone())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    CliProfile {
        api_base_url,
        device_id: Some(device_id),
        push_interval_secs: input.push_interval_secs.or(existing.push_interval_secs),
        pull_min_interval_ms: existing.pull_min_interval_ms,
    }
}

pub fn run_config_show(profile_name: Option<&str>, json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let resolved = config
        .profile(&profile_name)
        .cloned()
        .unwrap_or_default()
        .to_sync_config(|key| env::var(key).ok());

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    for line in format_config_lines(&profile_name, &resolved) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_config_lines(profile_name: &str, config: &SyncConfig) -> Vec<String> {
    vec![
        format!("profile             {profile_name}"),
        format!(
            "api_base_url        {}",
            config.api_base_url.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "device_id           {}",
            config.device_id.as_deref().unwrap_or("(from local database)")
        ),
        format!("push                {}", config.push_path),
        format!("pull                {}", config.pull_path),
        format!("push_interval_secs  {}", config.push_interval_secs),
        format!("pull_min_interval   {}ms", config.pull_min_interval_ms),
    ]
}
