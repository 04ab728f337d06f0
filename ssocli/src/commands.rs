use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct LoginCommand {
    /// Application instance id. Every AWS account or custom SAML application has a specific id in AWS SSO
    #[arg(short = 'i', long, visible_alias = "appinstanceid", env = "SSOCLI_APP_INSTANCE_ID")]
    pub app_instance_id: Option<String>,

    /// Role name. Actually the name of a portal profile, in practice the role you will assume
    #[arg(
        short = 'r',
        long,
        visible_alias = "rolename",
        env = "SSOCLI_ROLE_NAME",
        requires = "app_instance_id"
    )]
    pub role_name: Option<String>,

    /// The URL of your SSO directory
    #[arg(short = 'u', long, visible_alias = "directoryurl", env = "SSOCLI_DIRECTORY_URL")]
    pub directory_url: Option<String>,

    /// The name of your SSO directory
    #[arg(short = 'd', long, visible_alias = "dirname", env = "SSOCLI_DIR_NAME")]
    pub dir_name: Option<String>,

    /// The NETBIOS name of your SSO directory
    #[arg(short = 'n', long, env = "SSOCLI_NETBIOS")]
    pub netbios: Option<String>,

    /// The Active Directory user name used to log in
    #[arg(short = 'l', long, env = "SSOCLI_LOGIN")]
    pub login: Option<String>,

    /// The region to request STS credentials in and store as profile default
    #[arg(short = 's', long, visible_alias = "stsregion", env = "SSOCLI_STS_REGION")]
    pub sts_region: Option<String>,

    /// The region where your SSO directory resides
    #[arg(short = 'S', long, visible_alias = "ssoregion", env = "SSOCLI_SSO_REGION")]
    pub sso_region: Option<String>,

    /// The Active Directory password (prompted for when omitted)
    #[arg(short = 'p', long, env = "SSOCLI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// YAML file with directory settings
    #[arg(long, env = "SSOCLI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Credentials file to update
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Credentials file section to write
    #[arg(long)]
    pub profile: Option<String>,

    /// Output format stored alongside the credentials
    #[arg(long)]
    pub output_format: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not call GetCallerIdentity with the new credentials
    #[arg(long)]
    pub skip_identity_check: bool,
}
