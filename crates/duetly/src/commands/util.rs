//! Shared helpers for command handlers.

use std::io::IsTerminal;

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Join a controller directory and a file name with exactly one slash.
pub fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Last path component of a controller path.
pub fn remote_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_paths_join_cleanly() {
        assert_eq!(join_remote("0:/gcodes/", "/part.gcode"), "0:/gcodes/part.gcode");
        assert_eq!(join_remote("0:/sys", "config.g"), "0:/sys/config.g");
    }

    #[test]
    fn file_name_is_last_component() {
        assert_eq!(remote_file_name("0:/sys/config.g"), "config.g");
        assert_eq!(remote_file_name("bed.g"), "bed.g");
    }
}
