use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commands::LoginCommand;

/// Optional YAML configuration file. Every field can be overridden on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory settings
    #[serde(default)]
    pub directory: DirectorySection,

    /// STS and credentials file settings
    #[serde(default)]
    pub aws: AwsSection,

    /// Request timeout in seconds
    pub request_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySection {
    pub url: Option<String>,
    pub name: Option<String>,
    pub netbios: Option<String>,
    pub login: Option<String>,
    pub sso_region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsSection {
    pub sts_region: Option<String>,
    pub profile: Option<String>,
    pub output_format: Option<String>,
    pub credentials_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// Everything the directory session needs to log in
#[derive(Clone)]
pub struct DirectoryConfig {
    pub netbios: String,
    pub dir_name: String,
    pub directory_url: String,
    pub sso_region: String,
    pub login: String,
    pub password: String,
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("netbios", &self.netbios)
            .field("dir_name", &self.dir_name)
            .field("directory_url", &self.directory_url)
            .field("sso_region", &self.sso_region)
            .field("login", &self.login)
            .field("password", &"** redacted **")
            .finish()
    }
}

/// What to do once logged in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No instance id: list application instances
    ListInstances,
    /// Instance id only: list its roles
    ListRoles { app_instance_id: String },
    /// Instance id and role: fetch the assertion and store credentials
    AssumeRole {
        app_instance_id: String,
        role_name: String,
    },
}

/// STS and credentials file settings for the assume-role path
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sts_region: String,
    pub profile: String,
    pub output_format: String,
    pub credentials_file: PathBuf,
    pub verify_identity: bool,
}

/// Fully resolved settings for one invocation. The password is resolved separately.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub netbios: String,
    pub dir_name: String,
    pub directory_url: String,
    pub sso_region: String,
    pub login: String,
    pub request_timeout: Duration,
    pub selection: Selection,
    pub run: RunConfig,
}

impl ResolvedSettings {
    /// Merge command line, config file and defaults, in that order of precedence
    pub fn resolve(args: &LoginCommand, file: &FileConfig) -> Result<Self> {
        let pick = |cli: &Option<String>, from_file: &Option<String>, default: fn() -> String| {
            cli.clone()
                .or_else(|| from_file.clone())
                .unwrap_or_else(default)
        };

        let credentials_file = match args
            .credentials_file
            .clone()
            .or_else(|| file.aws.credentials_file.clone())
        {
            Some(path) => path,
            None => default_credentials_file()?,
        };

        let selection = match (&args.app_instance_id, &args.role_name) {
            (None, None) => Selection::ListInstances,
            (Some(id), None) => Selection::ListRoles {
                app_instance_id: id.clone(),
            },
            (Some(id), Some(role)) => Selection::AssumeRole {
                app_instance_id: id.clone(),
                role_name: role.clone(),
            },
            (None, Some(_)) => anyhow::bail!("--role-name requires --app-instance-id"),
        };

        Ok(Self {
            netbios: pick(&args.netbios, &file.directory.netbios, default_netbios),
            dir_name: pick(&args.dir_name, &file.directory.name, default_dir_name),
            directory_url: pick(&args.directory_url, &file.directory.url, default_directory_url),
            sso_region: pick(&args.sso_region, &file.directory.sso_region, default_sso_region),
            login: pick(&args.login, &file.directory.login, default_login),
            request_timeout: Duration::from_secs(
                args.timeout
                    .or(file.request_timeout)
                    .unwrap_or_else(default_request_timeout),
            ),
            selection,
            run: RunConfig {
                sts_region: pick(&args.sts_region, &file.aws.sts_region, default_sts_region),
                profile: pick(&args.profile, &file.aws.profile, default_profile),
                output_format: pick(
                    &args.output_format,
                    &file.aws.output_format,
                    default_output_format,
                ),
                credentials_file,
                verify_identity: !args.skip_identity_check,
            },
        })
    }

    pub fn directory_config(&self, password: String) -> DirectoryConfig {
        DirectoryConfig {
            netbios: self.netbios.clone(),
            dir_name: self.dir_name.clone(),
            directory_url: self.directory_url.clone(),
            sso_region: self.sso_region.clone(),
            login: self.login.clone(),
            password,
        }
    }
}

fn default_credentials_file() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".aws").join("credentials"))
}

// Default value functions
fn default_directory_url() -> String {
    "d-example.awsapps.com".to_string()
}
fn default_dir_name() -> String {
    "d-example".to_string()
}
fn default_netbios() -> String {
    "d-example".to_string()
}
fn default_login() -> String {
    "user1@example.com".to_string()
}
fn default_sts_region() -> String {
    "us-west-2".to_string()
}
fn default_sso_region() -> String {
    "us-east-1".to_string()
}
fn default_profile() -> String {
    "saml".to_string()
}
fn default_output_format() -> String {
    "json".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        login: LoginCommand,
    }

    fn parse(args: &[&str]) -> LoginCommand {
        let mut argv = vec!["ssocli", "--credentials-file", "/tmp/creds"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().login
    }

    #[test]
    fn test_defaults_apply_without_file() {
        let settings = ResolvedSettings::resolve(&parse(&[]), &FileConfig::default()).unwrap();

        assert_eq!(settings.directory_url, "d-example.awsapps.com");
        assert_eq!(settings.sso_region, "us-east-1");
        assert_eq!(settings.run.sts_region, "us-west-2");
        assert_eq!(settings.run.profile, "saml");
        assert_eq!(settings.run.output_format, "json");
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.selection, Selection::ListInstances);
        assert!(settings.run.verify_identity);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig::parse(
            r#"
directory:
  url: corp.awsapps.com
  name: d-corp
  login: alice@corp.example
aws:
  sts_region: eu-west-1
request_timeout: 5
"#,
        )
        .unwrap();

        let settings =
            ResolvedSettings::resolve(&parse(&["-l", "bob@corp.example"]), &file).unwrap();

        assert_eq!(settings.directory_url, "corp.awsapps.com");
        assert_eq!(settings.dir_name, "d-corp");
        assert_eq!(settings.login, "bob@corp.example");
        assert_eq!(settings.run.sts_region, "eu-west-1");
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_selection_branches() {
        let roles = ResolvedSettings::resolve(&parse(&["-i", "ins-1"]), &FileConfig::default())
            .unwrap();
        assert_eq!(
            roles.selection,
            Selection::ListRoles {
                app_instance_id: "ins-1".to_string()
            }
        );

        let assume = ResolvedSettings::resolve(
            &parse(&["-i", "ins-1", "-r", "ViewOnly"]),
            &FileConfig::default(),
        )
        .unwrap();
        assert_eq!(
            assume.selection,
            Selection::AssumeRole {
                app_instance_id: "ins-1".to_string(),
                role_name: "ViewOnly".to_string()
            }
        );
    }

    #[test]
    fn test_role_without_instance_is_rejected() {
        let result = TestCli::try_parse_from(["ssocli", "-r", "ViewOnly"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(FileConfig::parse("directory:\n  colour: blue\n").is_err());
        assert!(FileConfig::parse("").is_ok());
    }

    #[test]
    fn test_directory_config_debug_hides_password() {
        let settings = ResolvedSettings::resolve(&parse(&[]), &FileConfig::default()).unwrap();
        let config = settings.directory_config("hunter2".to_string());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
