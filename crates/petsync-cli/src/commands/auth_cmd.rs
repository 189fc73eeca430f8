use crate::auth::{TokenStore, ENV_TOKEN};
use crate::cli::AuthCommands;
use crate::commands::common::read_piped_stdin;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { token } => {
            let profile_name = resolve_profile(global_profile)?;
            let token = petsync_core::util::normalize_text_option(token)
                .map_or_else(read_piped_stdin, |token| Ok(Some(token)))?
                .ok_or_else(|| {
                    CliError::Auth("Provide a token with --token or on stdin".to_string())
                })?;
            TokenStore::new(&profile_name).save(&token)?;
            println!("Stored API token for profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Status => {
            let profile_name = resolve_profile(global_profile)?;
            if std::env::var(ENV_TOKEN).is_ok_and(|token| !token.trim().is_empty()) {
                println!("Profile '{profile_name}' uses the token from {ENV_TOKEN}.");
            } else if TokenStore::new(&profile_name).load()?.is_some() {
                println!("Profile '{profile_name}' has a stored API token.");
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let profile_name = resolve_profile(global_profile)?;
            TokenStore::new(&profile_name).clear()?;
            println!("Removed API token for profile '{profile_name}'");
            Ok(())
        }
    }
}

fn resolve_profile(explicit: Option<&str>) -> Result<String, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    Ok(config.resolve_profile_name(explicit))
}
