//! Credentials file updater.
//!
//! Rewrites one profile section of an AWS shared credentials file and keeps every
//! other section. The new file is written next to the old one and renamed over it.

use configparser::ini::Ini;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::{SsoError, SsoResult};
use crate::common::SessionCredentials;

/// Keys outside any section are kept under this name so they are written back headerless
const UNSECTIONED: &str = "__ssocli_unsectioned__";

pub struct CredentialSink {
    path: PathBuf,
}

impl CredentialSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn error(&self, message: impl Into<String>) -> SsoError {
        SsoError::credential_sink(self.path.display().to_string(), message)
    }

    fn new_ini() -> Ini {
        let mut ini = Ini::new_cs();
        ini.set_default_section(UNSECTIONED);
        ini
    }

    fn load(&self) -> SsoResult<Ini> {
        let mut ini = Self::new_ini();
        if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path).map_err(|e| self.error(e.to_string()))?;
            ini.read(contents).map_err(|e| self.error(e))?;
        }
        Ok(ini)
    }

    /// Create or replace `profile` with the given credentials
    pub fn write_profile(&self, profile: &str, credentials: &SessionCredentials) -> SsoResult<()> {
        let mut ini = self.load()?;

        // Drop stale keys from a previous run before writing the new set
        ini.remove_section(profile);
        let entries = [
            ("output", credentials.output_format.as_str()),
            ("region", credentials.region.as_str()),
            ("aws_access_key_id", credentials.access_key_id.as_str()),
            ("aws_secret_access_key", credentials.secret_access_key.as_str()),
            ("aws_session_token", credentials.session_token.as_str()),
        ];
        for (key, value) in entries {
            ini.set(profile, key, Some(value.to_string()));
        }

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.error(e.to_string()))?;

        let mut staged = NamedTempFile::new_in(&dir).map_err(|e| self.error(e.to_string()))?;
        staged
            .write_all(ini.writes().as_bytes())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| self.error(e.to_string()))?;
        staged
            .persist(&self.path)
            .map_err(|e| self.error(e.error.to_string()))?;

        debug!("Rewrote {}", self.path.display());
        info!(
            "Stored credentials in profile [{}] of {}",
            profile,
            self.path.display()
        );
        Ok(())
    }

    /// Read one key back from a profile
    pub fn read_value(&self, profile: &str, key: &str) -> SsoResult<Option<String>> {
        Ok(self.load()?.get(profile, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG/bPxRfiCY+EXAMPLE=".to_string(),
            session_token: "FwoGZXIvYXdzEJr//////////wEaDM+EXAMPLE==".to_string(),
            expiration: Utc::now(),
            region: "us-west-2".to_string(),
            output_format: "json".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let sink = CredentialSink::new(dir.path().join("credentials"));
        let creds = credentials();

        sink.write_profile("saml", &creds).unwrap();

        let read = |key: &str| sink.read_value("saml", key).unwrap().unwrap();
        assert_eq!(read("aws_access_key_id"), creds.access_key_id);
        assert_eq!(read("aws_secret_access_key"), creds.secret_access_key);
        assert_eq!(read("aws_session_token"), creds.session_token);
        assert_eq!(read("output"), "json");
        assert_eq!(read("region"), "us-west-2");
    }

    #[test]
    fn test_preserves_other_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = keep-me\n\n\
             [saml]\naws_access_key_id = OLD\nstale_key = gone\n\n\
             [Work-Profile]\nregion = eu-west-1\n",
        )
        .unwrap();

        let sink = CredentialSink::new(&path);
        sink.write_profile("saml", &credentials()).unwrap();

        assert_eq!(
            sink.read_value("default", "aws_secret_access_key").unwrap().as_deref(),
            Some("keep-me")
        );
        assert_eq!(
            sink.read_value("Work-Profile", "region").unwrap().as_deref(),
            Some("eu-west-1")
        );
        assert_eq!(
            sink.read_value("saml", "aws_access_key_id").unwrap().as_deref(),
            Some("ASIAEXAMPLE")
        );
        assert_eq!(sink.read_value("saml", "stale_key").unwrap(), None);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[default]"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".aws").join("credentials");
        CredentialSink::new(&path)
            .write_profile("saml", &credentials())
            .unwrap();
        assert!(path.exists());
    }
}
