// Integration tests for azdo-auth
//
// These tests drive get_auth_token end to end with a recording identity
// factory, checking which credential constructor is invoked and with what.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{Duration, Utc};
use mockito::Matcher;
use rcgen::{CertificateParams, KeyPair, PKCS_RSA_SHA256};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use azdo_auth::auth::{
    parse_certificates, AccessToken, AssertionSource, Certificate, IdentityFactory, PrivateKey,
    TokenGetter, TokenRequestOptions, AZURE_DEVOPS_SCOPE,
};
use azdo_auth::env::{
    EnvSource, MapEnv, ACTIONS_ID_TOKEN_REQUEST_TOKEN, ACTIONS_ID_TOKEN_REQUEST_URL,
    TFC_WORKLOAD_IDENTITY_TOKEN,
};
use azdo_auth::{get_auth_token, AuthConfig, AuthError, AuthResolver};

const CLIENT_ID: &str = "00000000-0000-0000-0000-000000000001";
const TENANT_ID: &str = "00000000-0000-0000-0000-000000000002";
const ACCESS_TOKEN: &str = "thepassword";

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Credential constructor invocation seen by the recording factory
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Assertion {
        tenant_id: String,
        client_id: String,
        assertion: String,
    },
    Secret {
        tenant_id: String,
        client_id: String,
        secret: String,
    },
    Certificate {
        tenant_id: String,
        client_id: String,
        certificates: Vec<Certificate>,
        key: PrivateKey,
    },
}

type CallLog = Arc<Mutex<Vec<Call>>>;

/// Identity factory double that records calls and hands out a fixed token
///
/// Assertion credentials are recorded when their token is requested, so the
/// log carries the assertion as it was resolved at that point.
#[derive(Default)]
struct RecordingIdentity {
    calls: CallLog,
}

/// Token getter returning a fixed token
struct FixedToken {
    pending: Option<(Arc<dyn AssertionSource>, String, String, CallLog)>,
}

#[async_trait]
impl TokenGetter for FixedToken {
    async fn get_token(
        &self,
        cancel: &CancellationToken,
        options: &TokenRequestOptions,
    ) -> azdo_auth::Result<AccessToken> {
        assert_eq!(options.scopes, vec![AZURE_DEVOPS_SCOPE.to_string()]);

        if let Some((source, tenant_id, client_id, calls)) = &self.pending {
            let assertion = source.assertion(cancel).await?;
            calls
                .lock()
                .unwrap()
                .push(assertion_call(tenant_id, client_id, &assertion));
        }

        Ok(AccessToken {
            token: ACCESS_TOKEN.to_string(),
            expires_on: Utc::now() + Duration::hours(1),
        })
    }
}

impl IdentityFactory for RecordingIdentity {
    fn new_client_assertion_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        assertion: Arc<dyn AssertionSource>,
    ) -> azdo_auth::Result<Box<dyn TokenGetter>> {
        Ok(Box::new(FixedToken {
            pending: Some((
                assertion,
                tenant_id.to_string(),
                client_id.to_string(),
                self.calls.clone(),
            )),
        }))
    }

    fn new_client_secret_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> azdo_auth::Result<Box<dyn TokenGetter>> {
        self.calls.lock().unwrap().push(Call::Secret {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            secret: client_secret.to_string(),
        });
        Ok(Box::new(FixedToken { pending: None }))
    }

    fn new_client_certificate_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        certificates: Vec<Certificate>,
        key: PrivateKey,
    ) -> azdo_auth::Result<Box<dyn TokenGetter>> {
        self.calls.lock().unwrap().push(Call::Certificate {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            certificates,
            key,
        });
        Ok(Box::new(FixedToken { pending: None }))
    }
}

/// Runs get_auth_token against a shared recording factory
#[derive(Default)]
struct Harness {
    identity: Arc<RecordingIdentity>,
}

impl Harness {
    async fn run(&self, config: &AuthConfig, env: MapEnv) -> azdo_auth::Result<String> {
        let env: Arc<dyn EnvSource> = Arc::new(env);
        get_auth_token(&CancellationToken::new(), config, self.identity.clone(), env).await
    }

    fn calls(&self) -> Vec<Call> {
        self.identity.calls.lock().unwrap().clone()
    }
}

fn principal_config() -> AuthConfig {
    AuthConfig {
        client_id: Some(CLIENT_ID.to_string()),
        tenant_id: Some(TENANT_ID.to_string()),
        ..Default::default()
    }
}

fn assertion_call(tenant_id: &str, client_id: &str, assertion: &str) -> Call {
    Call::Assertion {
        tenant_id: tenant_id.to_string(),
        client_id: client_id.to_string(),
        assertion: assertion.to_string(),
    }
}

fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file
}

/// Self-signed RSA certificate followed by its PKCS#8 key
fn generate_bundle() -> String {
    let key = KeyPair::generate_for(&PKCS_RSA_SHA256).unwrap();
    let params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    let cert = params.self_signed(&key).unwrap();
    format!("{}{}", cert.pem(), key.serialize_pem())
}

fn phase_token(phase: &str) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"terraform_run_phase":"{}"}}"#, phase));
    format!("eyJhbGciOiJSUzI1NiJ9.{}.c2lnbmF0dXJl", payload)
}

// ==================================================================================================
// Personal Access Token
// ==================================================================================================

#[tokio::test]
async fn test_pat_returned_without_exchange() {
    let harness = Harness::default();
    let config = AuthConfig {
        personal_access_token: Some("my-pat".to_string()),
        ..principal_config()
    };

    let token = harness.run(&config, MapEnv::default()).await.unwrap();

    assert_eq!(token, "my-pat");
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn test_no_auth_configured() {
    let harness = Harness::default();

    let err = harness
        .run(&AuthConfig::default(), MapEnv::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Config(_)));
    assert!(harness.calls().is_empty());
}

// ==================================================================================================
// OIDC Token
// ==================================================================================================

#[tokio::test]
async fn test_oidc_token_inline() {
    let harness = Harness::default();
    let config = AuthConfig {
        oidc_token: Some("buffalo123".to_string()),
        ..principal_config()
    };

    let token = harness.run(&config, MapEnv::default()).await.unwrap();

    assert_eq!(token, ACCESS_TOKEN);
    assert_eq!(
        harness.calls(),
        vec![assertion_call(TENANT_ID, CLIENT_ID, "buffalo123")]
    );
}

#[tokio::test]
async fn test_oidc_token_file() {
    let harness = Harness::default();
    let file = write_temp(b"buffalo123\n");
    let config = AuthConfig {
        oidc_token_path: Some(file.path().to_path_buf()),
        ..principal_config()
    };

    let token = harness.run(&config, MapEnv::default()).await.unwrap();

    assert_eq!(token, ACCESS_TOKEN);
    assert_eq!(
        harness.calls(),
        vec![assertion_call(TENANT_ID, CLIENT_ID, "buffalo123")]
    );
}

// ==================================================================================================
// HCP Terraform Workload Identity
// ==================================================================================================

#[tokio::test]
async fn test_hcp_token_without_phase() {
    let harness = Harness::default();
    let config = AuthConfig {
        oidc_hcp: true,
        ..principal_config()
    };
    let env = MapEnv::new([(TFC_WORKLOAD_IDENTITY_TOKEN, "tokenvalue")]);

    let token = harness.run(&config, env).await.unwrap();

    assert_eq!(token, ACCESS_TOKEN);
    assert_eq!(
        harness.calls(),
        vec![assertion_call(TENANT_ID, CLIENT_ID, "tokenvalue")]
    );
}

#[tokio::test]
async fn test_hcp_plan_and_apply_identities() {
    let harness = Harness::default();
    let config = AuthConfig {
        oidc_hcp: true,
        client_id_apply: Some("clientId_apply".to_string()),
        tenant_id_apply: Some("tenantId_apply".to_string()),
        client_id_plan: Some("clientId_plan".to_string()),
        tenant_id_plan: Some("tenantId_plan".to_string()),
        ..principal_config()
    };

    let apply_token = phase_token("apply");
    harness
        .run(
            &config,
            MapEnv::new([(TFC_WORKLOAD_IDENTITY_TOKEN, apply_token.as_str())]),
        )
        .await
        .unwrap();

    let plan_token = phase_token("plan");
    harness
        .run(
            &config,
            MapEnv::new([(TFC_WORKLOAD_IDENTITY_TOKEN, plan_token.as_str())]),
        )
        .await
        .unwrap();

    assert_eq!(
        harness.calls(),
        vec![
            assertion_call("tenantId_apply", "clientId_apply", &apply_token),
            assertion_call("tenantId_plan", "clientId_plan", &plan_token),
        ]
    );
}

#[tokio::test]
async fn test_hcp_missing_phase_identity() {
    let harness = Harness::default();
    let config = AuthConfig {
        oidc_hcp: true,
        ..principal_config()
    };
    let env = MapEnv::new([(TFC_WORKLOAD_IDENTITY_TOKEN, phase_token("apply"))]);

    let err = harness.run(&config, env).await.unwrap_err();

    assert!(matches!(err, AuthError::Config(_)));
    assert!(harness.calls().is_empty());
}

// ==================================================================================================
// GitHub Actions OIDC
// ==================================================================================================

async fn run_github_actions(audience: Option<&str>, expected_audience: &str) {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/token")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("api-version".into(), "2.0".into()),
            Matcher::UrlEncoded("audience".into(), expected_audience.into()),
        ]))
        .match_header("authorization", "Bearer gh_oidc_token")
        .match_body(Matcher::Exact(String::new()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"value":"buffalo123"}"#)
        .expect(1)
        .create_async()
        .await;

    let env = MapEnv::new([
        (
            ACTIONS_ID_TOKEN_REQUEST_URL.to_string(),
            format!("{}/token?api-version=2.0", server.url()),
        ),
        (
            ACTIONS_ID_TOKEN_REQUEST_TOKEN.to_string(),
            "gh_oidc_token".to_string(),
        ),
    ]);

    let harness = Harness::default();
    let config = AuthConfig {
        oidc_github_actions: true,
        oidc_github_actions_audience: audience.map(str::to_string),
        ..principal_config()
    };

    let token = harness.run(&config, env).await.unwrap();

    assert_eq!(token, ACCESS_TOKEN);
    assert_eq!(
        harness.calls(),
        vec![assertion_call(TENANT_ID, CLIENT_ID, "buffalo123")]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_github_actions_default_audience() {
    run_github_actions(None, "api://AzureADTokenExchange").await;
}

#[tokio::test]
async fn test_github_actions_custom_audience() {
    run_github_actions(Some("my-test-audience"), "my-test-audience").await;
}

#[tokio::test]
async fn test_github_actions_endpoint_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/token")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let env = MapEnv::new([
        (
            ACTIONS_ID_TOKEN_REQUEST_URL.to_string(),
            format!("{}/token", server.url()),
        ),
        (
            ACTIONS_ID_TOKEN_REQUEST_TOKEN.to_string(),
            "gh_oidc_token".to_string(),
        ),
    ]);

    let harness = Harness::default();
    let config = AuthConfig {
        oidc_github_actions: true,
        ..principal_config()
    };

    let err = harness.run(&config, env).await.unwrap_err();
    assert!(matches!(err, AuthError::FederationFetch(_)));
}

// ==================================================================================================
// Client Secret
// ==================================================================================================

#[tokio::test]
async fn test_client_secret_inline() {
    let harness = Harness::default();
    let config = AuthConfig {
        client_secret: Some("buffalo123".to_string()),
        ..principal_config()
    };

    let token = harness.run(&config, MapEnv::default()).await.unwrap();

    assert_eq!(token, ACCESS_TOKEN);
    assert_eq!(
        harness.calls(),
        vec![Call::Secret {
            tenant_id: TENANT_ID.to_string(),
            client_id: CLIENT_ID.to_string(),
            secret: "buffalo123".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_client_secret_file() {
    let harness = Harness::default();
    let file = write_temp(b"buffalo123\n");
    let config = AuthConfig {
        client_secret_path: Some(file.path().to_path_buf()),
        ..principal_config()
    };

    harness.run(&config, MapEnv::default()).await.unwrap();

    assert_eq!(
        harness.calls(),
        vec![Call::Secret {
            tenant_id: TENANT_ID.to_string(),
            client_id: CLIENT_ID.to_string(),
            secret: "buffalo123".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_client_secret_file_unreadable() {
    let harness = Harness::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing");
    let config = AuthConfig {
        client_secret_path: Some(path.clone()),
        ..principal_config()
    };

    let err = harness.run(&config, MapEnv::default()).await.unwrap_err();

    match err {
        AuthError::Io { path: p, .. } => assert_eq!(p, path),
        other => panic!("expected Io, got {:?}", other),
    }
    assert!(harness.calls().is_empty());
}

// ==================================================================================================
// Client Certificate
// ==================================================================================================

#[tokio::test]
async fn test_client_certificate_inline_and_file() {
    let bundle = generate_bundle();
    let expected = parse_certificates(bundle.as_bytes(), None).unwrap();
    let file = write_temp(bundle.as_bytes());

    let configs = [
        AuthConfig {
            client_certificate: Some(STANDARD.encode(&bundle)),
            ..principal_config()
        },
        AuthConfig {
            client_certificate_path: Some(file.path().to_path_buf()),
            ..principal_config()
        },
    ];

    for config in configs {
        let harness = Harness::default();
        let token = harness.run(&config, MapEnv::default()).await.unwrap();

        assert_eq!(token, ACCESS_TOKEN);
        assert_eq!(
            harness.calls(),
            vec![Call::Certificate {
                tenant_id: TENANT_ID.to_string(),
                client_id: CLIENT_ID.to_string(),
                certificates: expected.certificates.clone(),
                key: expected.key.clone(),
            }]
        );
        assert_eq!(expected.certificates.len(), 1);
    }
}

// ==================================================================================================
// Entra ID end to end
// ==================================================================================================

#[tokio::test]
async fn test_entra_client_secret_exchange() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("/{}/oauth2/v2.0/token", TENANT_ID).as_str())
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), CLIENT_ID.into()),
            Matcher::UrlEncoded("client_secret".into(), "buffalo123".into()),
            Matcher::UrlEncoded("scope".into(), AZURE_DEVOPS_SCOPE.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"thepassword"}"#)
        .expect(1)
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let resolver = AuthResolver::with_parts(
        Arc::new(azdo_auth::auth::EntraIdentity::with_authority(
            http.clone(),
            server.url(),
        )),
        Arc::new(MapEnv::default()),
        http,
    );
    let config = AuthConfig {
        client_secret: Some("buffalo123".to_string()),
        ..principal_config()
    };

    let token = resolver
        .get_auth_token(&CancellationToken::new(), &config)
        .await
        .unwrap();

    assert_eq!(token, ACCESS_TOKEN);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cancelled_exchange_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let resolver = AuthResolver::with_parts(
        Arc::new(azdo_auth::auth::EntraIdentity::with_authority(
            http.clone(),
            server.url(),
        )),
        Arc::new(MapEnv::default()),
        http,
    );
    let config = AuthConfig {
        client_secret: Some("buffalo123".to_string()),
        ..principal_config()
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = resolver.get_auth_token(&cancel, &config).await.unwrap_err();

    assert!(matches!(err, AuthError::Cancelled));
    mock.assert_async().await;
}

/// Accepts connections and never answers
async fn unresponsive_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{}", addr)
}

/// Cancel shortly after the request has gone out
fn cancel_soon() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn test_cancel_during_token_exchange() {
    let authority = unresponsive_server().await;
    let http = reqwest::Client::new();
    let resolver = AuthResolver::with_parts(
        Arc::new(azdo_auth::auth::EntraIdentity::with_authority(
            http.clone(),
            authority,
        )),
        Arc::new(MapEnv::default()),
        http,
    );
    let config = AuthConfig {
        client_secret: Some("buffalo123".to_string()),
        ..principal_config()
    };

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        resolver.get_auth_token(&cancel_soon(), &config),
    )
    .await
    .expect("token request did not observe cancellation");

    assert!(matches!(result, Err(AuthError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_during_github_oidc_fetch() {
    let endpoint = unresponsive_server().await;
    let env = MapEnv::new([
        (
            ACTIONS_ID_TOKEN_REQUEST_URL.to_string(),
            format!("{}/token?api-version=2.0", endpoint),
        ),
        (
            ACTIONS_ID_TOKEN_REQUEST_TOKEN.to_string(),
            "gh_oidc_token".to_string(),
        ),
    ]);

    let harness = Harness::default();
    let config = AuthConfig {
        oidc_github_actions: true,
        ..principal_config()
    };

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        get_auth_token(
            &cancel_soon(),
            &config,
            harness.identity.clone(),
            Arc::new(env),
        ),
    )
    .await
    .expect("OIDC fetch did not observe cancellation");

    assert!(matches!(result, Err(AuthError::Cancelled)));
    assert!(harness.calls().is_empty());
}
