use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sts::config::Region;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::error::{SsoError, SsoResult};
use crate::common::{CallerIdentity, RoleArns, SessionCredentials};

/// Trades a SAML assertion for temporary credentials
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn assume_role_with_saml(
        &self,
        arns: &RoleArns,
        assertion: &str,
        output_format: &str,
    ) -> SsoResult<SessionCredentials>;

    /// Who the new credentials authenticate as
    async fn caller_identity(&self, credentials: &SessionCredentials)
        -> SsoResult<CallerIdentity>;
}

pub struct AwsService {
    pub sts_client: StsClient,
    pub region: String,
    sdk_config: aws_config::SdkConfig,
}

impl AwsService {
    /// STS client for `region`. No local credentials are loaded, AssumeRoleWithSAML is unsigned.
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .no_credentials()
            .load()
            .await;

        Self {
            sts_client: StsClient::new(&sdk_config),
            region: region.to_string(),
            sdk_config,
        }
    }
}

#[async_trait]
impl CredentialExchange for AwsService {
    #[instrument(skip(self, assertion), fields(region = %self.region))]
    async fn assume_role_with_saml(
        &self,
        arns: &RoleArns,
        assertion: &str,
        output_format: &str,
    ) -> SsoResult<SessionCredentials> {
        let output = self
            .sts_client
            .assume_role_with_saml()
            .role_arn(&arns.role_arn)
            .principal_arn(&arns.principal_arn)
            .saml_assertion(assertion)
            .send()
            .await
            .map_err(|e| SsoError::role_assumption(DisplayErrorContext(&e).to_string()))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| SsoError::role_assumption("response contained no credentials"))?;
        let expiration = credentials.expiration();
        let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| SsoError::role_assumption("credential expiration out of range"))?;

        info!("Assumed {}", arns.role_arn);
        Ok(SessionCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
            region: self.region.clone(),
            output_format: output_format.to_string(),
        })
    }

    async fn caller_identity(
        &self,
        credentials: &SessionCredentials,
    ) -> SsoResult<CallerIdentity> {
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            None,
            "ssocli",
        );
        let config = aws_sdk_sts::config::Builder::from(&self.sdk_config)
            .credentials_provider(provider)
            .build();

        let identity = StsClient::from_conf(config)
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| SsoError::transport(DisplayErrorContext(&e).to_string()))?;

        Ok(CallerIdentity {
            arn: identity.arn().unwrap_or_default().to_string(),
            account_id: identity.account().unwrap_or_default().to_string(),
            user_id: identity.user_id().unwrap_or_default().to_string(),
        })
    }
}

/// Fixed-answer exchange for driver tests
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StubExchange {
        pub calls: Mutex<Vec<(RoleArns, String)>>,
    }

    #[async_trait]
    impl CredentialExchange for StubExchange {
        async fn assume_role_with_saml(
            &self,
            arns: &RoleArns,
            assertion: &str,
            output_format: &str,
        ) -> SsoResult<SessionCredentials> {
            self.calls
                .lock()
                .unwrap()
                .push((arns.clone(), assertion.to_string()));
            Ok(SessionCredentials {
                access_key_id: "ASIAEXAMPLE".to_string(),
                secret_access_key: "wJalrXUtnFEMI/K7MDENG".to_string(),
                session_token: "FwoGZXIvYXdzEXAMPLE==".to_string(),
                expiration: Utc::now(),
                region: "us-west-2".to_string(),
                output_format: output_format.to_string(),
            })
        }

        async fn caller_identity(
            &self,
            _credentials: &SessionCredentials,
        ) -> SsoResult<CallerIdentity> {
            Ok(CallerIdentity {
                arn: "arn:aws:sts::111122223333:assumed-role/Foo/alice".to_string(),
                account_id: "111122223333".to_string(),
                user_id: "AROAEXAMPLE:alice".to_string(),
            })
        }
    }
}
