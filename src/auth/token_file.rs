use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::credential::Credential;
use crate::error::{NotifierError, Result};

const APP_DIR: &str = "gmail_line_notifier";

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| NotifierError::Config("no config dir available".into()))?
        .join(APP_DIR))
}

/// Local credential cache, `~/.config/gmail_line_notifier/token.json` on Linux.
pub fn token_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("token.json"))
}

/// Write the credential, readable by the owner only.
pub fn save(path: &Path, credential: &Credential) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, credential.to_json()?)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Load the credential if the file exists.
pub fn load(path: &Path) -> Result<Option<Credential>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)?;
    Credential::from_json(&s).map(Some)
}
