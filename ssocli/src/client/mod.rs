use anyhow::{Context, Result};
use dialoguer::Password;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::commands::LoginCommand;
use crate::common::config::{FileConfig, ResolvedSettings, RunConfig, Selection};
use crate::common::{ApplicationInstance, CallerIdentity, RoleProfile, SessionCredentials};
use aws::{AwsService, CredentialExchange};
use error::SsoResult;
use session::DirectorySession;
use sink::CredentialSink;
use transport::HyperTransport;

pub mod aws;
pub mod codec;
pub mod cookies;
pub mod error;
pub mod saml;
pub mod session;
pub mod sink;
pub mod transport;

/// What a login run produced
#[derive(Debug)]
pub enum Outcome {
    Instances(Vec<ApplicationInstance>),
    Roles {
        app_instance_id: String,
        roles: Vec<RoleProfile>,
    },
    Credentials {
        credentials: SessionCredentials,
        identity: Option<CallerIdentity>,
    },
}

pub async fn run(args: LoginCommand, verbose: bool) -> Result<()> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = ResolvedSettings::resolve(&args, &file)?;

    println!();
    println!("   🌐 Directory URL:   {}", settings.directory_url);
    println!("   📁 Directory Name:  {}", settings.dir_name);
    println!("   🏷️  NETBIOS Name:    {}", settings.netbios);
    println!("   🗺️  SSO Region:      {}", settings.sso_region);
    println!("   🔑 STS Region:      {}", settings.run.sts_region);
    println!();

    let password = match args.password.clone() {
        Some(password) => password,
        None => {
            debug!("Asking for password");
            Password::new()
                .with_prompt(format!("Please type password for user {}", settings.login))
                .interact()
                .context("Failed to read password")?
        }
    };

    let transport = Arc::new(HyperTransport::new(settings.request_timeout));
    let session = DirectorySession::new(settings.directory_config(password), transport);
    let exchange = AwsService::new(&settings.run.sts_region).await;

    let outcome = execute(&session, &settings.selection, &settings.run, &exchange).await?;
    report(&outcome, &session, &settings.run, verbose);
    Ok(())
}

/// Drive the login protocol for one selection
pub async fn execute(
    session: &DirectorySession,
    selection: &Selection,
    run: &RunConfig,
    exchange: &dyn CredentialExchange,
) -> SsoResult<Outcome> {
    debug!("Step 1: getting authentication code");
    let auth_code = session.obtain_authentication_code().await?;

    debug!("Step 2: exchanging authentication code for access token");
    let token = session.obtain_access_token(auth_code).await?;
    info!("Portal session established (token {})", token.fingerprint());

    match selection {
        Selection::ListInstances => {
            debug!("Step 3: listing application instances");
            let instances = session.list_application_instances(&token).await?;
            Ok(Outcome::Instances(instances))
        }
        Selection::ListRoles { app_instance_id } => {
            debug!("Step 3: listing roles for {}", app_instance_id);
            let roles = session
                .list_roles_for_application_instance(app_instance_id, &token)
                .await?;
            Ok(Outcome::Roles {
                app_instance_id: app_instance_id.clone(),
                roles,
            })
        }
        Selection::AssumeRole {
            app_instance_id,
            role_name,
        } => {
            debug!("Step 3: getting SAML assertion for {}", role_name);
            let assertion = session
                .get_saml_assertion(app_instance_id, role_name, &token)
                .await?;

            debug!("Step 4: exchanging SAML assertion for AWS credentials");
            let arns = saml::decode(&assertion)?;
            let credentials = exchange
                .assume_role_with_saml(&arns, &assertion, &run.output_format)
                .await?;

            CredentialSink::new(&run.credentials_file).write_profile(&run.profile, &credentials)?;

            let identity = if run.verify_identity {
                match exchange.caller_identity(&credentials).await {
                    Ok(identity) => {
                        info!("Validated IAM identity: {}", identity.arn);
                        Some(identity)
                    }
                    Err(e) => {
                        warn!("Could not verify the new credentials: {}", e);
                        None
                    }
                }
            } else {
                None
            };

            Ok(Outcome::Credentials {
                credentials,
                identity,
            })
        }
    }
}

fn report(outcome: &Outcome, session: &DirectorySession, run: &RunConfig, verbose: bool) {
    match outcome {
        Outcome::Instances(instances) => {
            println!(
                "   - Listing application instances for user {}:",
                session.config().login
            );
            println!();
            for instance in instances {
                println!("Id: {}", instance.id);
                println!("Name: {}", instance.name);
                println!("Description: {}", instance.description);
                println!();
            }
            if verbose {
                println!("To list the roles you can assume in an AWS account, pass its");
                println!("application instance id as argument. For example:");
                println!();
                println!("   ssocli -i ins-1becf2edf4961234");
                println!();
            }
        }
        Outcome::Roles {
            app_instance_id,
            roles,
        } => {
            println!(
                "   - Listing profiles (roles) available for the application instance {}",
                app_instance_id
            );
            println!();
            for role in roles {
                println!("Name: {}", role.name);
            }
            println!();
            if verbose {
                println!("To assume one of the roles listed above, pass its name along");
                println!("with the application instance id. For example:");
                println!();
                println!("   ssocli -i {} -r ViewOnlyAccess", app_instance_id);
                println!();
            }
        }
        Outcome::Credentials {
            credentials,
            identity,
        } => {
            println!(
                "✅ STS credentials have been stored in {} under the {} profile.",
                run.credentials_file.display(),
                run.profile
            );
            println!("   Note that they will expire at {}.", credentials.expiration);
            println!("   To use them, call the AWS CLI with the --profile option:");
            println!();
            println!("   aws sts get-caller-identity --profile {}", run.profile);
            println!();
            if let Some(identity) = identity {
                println!("AssumedRoleIdentity: {}", identity.arn);
                println!("Account: {}", identity.account_id);
                println!("UserId: {}", identity.user_id);
                println!();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::aws::stub::StubExchange;
    use crate::client::error::SsoError;
    use crate::client::saml::tests::saml_response;
    use crate::client::transport::stub::StubTransport;
    use crate::common::config::DirectoryConfig;
    use tempfile::TempDir;

    const ROLE_VALUE: &str =
        "arn:aws:iam::111122223333:role/Foo,arn:aws:iam::111122223333:saml-provider/Bar";

    fn directory() -> DirectoryConfig {
        DirectoryConfig {
            netbios: "CORP".to_string(),
            dir_name: "d-corp".to_string(),
            directory_url: "d-corp.awsapps.com".to_string(),
            sso_region: "us-east-1".to_string(),
            login: "alice@corp.example".to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn run_config(dir: &TempDir) -> RunConfig {
        RunConfig {
            sts_region: "us-west-2".to_string(),
            profile: "saml".to_string(),
            output_format: "json".to_string(),
            credentials_file: dir.path().join("credentials"),
            verify_identity: true,
        }
    }

    /// Login and token steps answered successfully
    fn logged_in() -> StubTransport {
        StubTransport::new()
            .respond(200, r#"//OK[0,1,2,3,4,5,6,7,["x","CODE-42"],"tail"]"#)
            .respond_with_headers(
                302,
                &[
                    ("location", "https://portal.sso.us-east-1.amazonaws.com/start/"),
                    ("set-cookie", "x-amz-sso_authn=SESSION; Path=/"),
                ],
                "",
            )
            .respond(200, "")
    }

    #[tokio::test]
    async fn test_full_run_writes_credentials() {
        let dir = TempDir::new().unwrap();
        let assertion = saml_response(&[ROLE_VALUE]);
        let stub = Arc::new(
            logged_in()
                .respond(
                    200,
                    r#"{"result":[{"name":"Foo","url":"https://portal.sso.us-east-1.amazonaws.com/samlAssertion/Foo"}]}"#,
                )
                .respond(200, &format!(r#"{{"encodedResponse":"{}"}}"#, assertion)),
        );
        let session = DirectorySession::new(directory(), stub.clone());
        let exchange = StubExchange::default();
        let run = run_config(&dir);
        let selection = Selection::AssumeRole {
            app_instance_id: "ins-1".to_string(),
            role_name: "Foo".to_string(),
        };

        let outcome = execute(&session, &selection, &run, &exchange).await.unwrap();

        let Outcome::Credentials {
            credentials,
            identity,
        } = outcome
        else {
            panic!("expected credentials");
        };
        assert!(!credentials.access_key_id.is_empty());
        assert!(!credentials.session_token.is_empty());
        assert_eq!(
            identity.unwrap().arn,
            "arn:aws:sts::111122223333:assumed-role/Foo/alice"
        );

        let calls = exchange.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.role_arn, "arn:aws:iam::111122223333:role/Foo");
        assert_eq!(calls[0].1, assertion);

        let sink = CredentialSink::new(&run.credentials_file);
        assert_eq!(
            sink.read_value("saml", "output").unwrap().as_deref(),
            Some("json")
        );
        assert_eq!(
            sink.read_value("saml", "aws_session_token").unwrap().as_deref(),
            Some(credentials.session_token.as_str())
        );
        assert_eq!(stub.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_list_instances_branch() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(logged_in().respond(
            200,
            r#"{"result":[{"id":"ins-1","name":"prod","description":"Production"}]}"#,
        ));
        let session = DirectorySession::new(directory(), stub);

        let outcome = execute(
            &session,
            &Selection::ListInstances,
            &run_config(&dir),
            &StubExchange::default(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Instances(ref list) if list.len() == 1));
        assert!(!dir.path().join("credentials").exists());
    }

    #[tokio::test]
    async fn test_empty_assertion_stops_before_exchange() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(
            logged_in()
                .respond(200, r#"{"result":[{"name":"Foo","url":"https://portal/saml"}]}"#)
                .respond(200, r#"{"encodedResponse":""}"#),
        );
        let session = DirectorySession::new(directory(), stub);
        let exchange = StubExchange::default();

        let err = execute(
            &session,
            &Selection::AssumeRole {
                app_instance_id: "ins-1".to_string(),
                role_name: "Foo".to_string(),
            },
            &run_config(&dir),
            &exchange,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SsoError::EmptyAssertion));
        assert!(exchange.calls.lock().unwrap().is_empty());
        assert!(!dir.path().join("credentials").exists());
    }

    #[tokio::test]
    async fn test_failed_login_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(StubTransport::new().respond(500, "Internal Server Error"));
        let session = DirectorySession::new(directory(), stub.clone());

        let err = execute(
            &session,
            &Selection::ListInstances,
            &run_config(&dir),
            &StubExchange::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SsoError::AuthenticationCode { .. }));
        assert_eq!(stub.requests().len(), 1);
    }
}
