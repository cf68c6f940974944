// Credential strategy selection
// Decides which single authentication method a configuration resolves to

use super::certificate::{load_certificate, parse_certificates};
use super::credentials::load_secret;
use super::federation::github_audience;
use super::jwt;
use super::types::{AssertionKind, AuthStrategy, RunPhase, ServicePrincipal};
use crate::config::AuthConfig;
use crate::env::{EnvSource, TFC_WORKLOAD_IDENTITY_TOKEN};
use crate::error::{AuthError, Result};

/// Pick the authentication strategy for a configuration
///
/// Methods are tried in a fixed order and the first one configured wins:
/// personal access token, OIDC token (inline or file), GitHub Actions OIDC,
/// HCP Terraform workload identity, client secret, client certificate.
/// Once a method is chosen, its own validation errors are returned rather
/// than falling through to the next one.
pub fn select_strategy(config: &AuthConfig, env: &dyn EnvSource) -> Result<AuthStrategy> {
    let strategy = select(config, env)?;

    match strategy.principal() {
        Some(principal) => tracing::info!(
            "Authenticating with {} as client {}... in tenant {}",
            strategy.name(),
            principal.client_id.chars().take(8).collect::<String>(),
            principal.tenant_id
        ),
        None => tracing::info!("Authenticating with {}", strategy.name()),
    }

    Ok(strategy)
}

fn select(config: &AuthConfig, env: &dyn EnvSource) -> Result<AuthStrategy> {
    if let Some(pat) = config
        .personal_access_token
        .as_deref()
        .filter(|v| !v.is_empty())
    {
        return Ok(AuthStrategy::PersonalAccessToken(pat.to_string()));
    }

    if let Some(token) = load_secret(
        config.oidc_token.as_deref(),
        config.oidc_token_path.as_deref(),
    )?
    .filter(|v| !v.is_empty())
    {
        return Ok(AuthStrategy::ClientAssertion {
            principal: single_principal(config)?,
            assertion: AssertionKind::Static(token),
        });
    }

    if config.oidc_github_actions {
        return Ok(AuthStrategy::ClientAssertion {
            principal: single_principal(config)?,
            assertion: AssertionKind::GitHubActions {
                audience: github_audience(config.oidc_github_actions_audience.as_deref()),
            },
        });
    }

    if config.oidc_hcp {
        return workload_identity(config, env);
    }

    if let Some(secret) = load_secret(
        config.client_secret.as_deref(),
        config.client_secret_path.as_deref(),
    )?
    .filter(|v| !v.is_empty())
    {
        return Ok(AuthStrategy::ClientSecret {
            principal: single_principal(config)?,
            secret,
        });
    }

    if let Some(data) = load_certificate(
        config.client_certificate.as_deref(),
        config.client_certificate_path.as_deref(),
    )? {
        let principal = single_principal(config)?;
        let bundle = parse_certificates(&data, config.client_certificate_password.as_deref())?;
        return Ok(AuthStrategy::ClientCertificate { principal, bundle });
    }

    Err(AuthError::Config(
        "no authentication method configured; set personal_access_token or a service principal \
         credential (sp_oidc_token, sp_oidc_github_actions, sp_oidc_hcp, sp_client_secret or \
         sp_client_certificate)"
            .to_string(),
    ))
}

/// HCP Terraform workload identity: the run phase picks the identity
fn workload_identity(config: &AuthConfig, env: &dyn EnvSource) -> Result<AuthStrategy> {
    let token = env.var(TFC_WORKLOAD_IDENTITY_TOKEN).ok_or_else(|| {
        AuthError::Config(format!(
            "sp_oidc_hcp is set but {} is not present in the environment",
            TFC_WORKLOAD_IDENTITY_TOKEN
        ))
    })?;

    let phase = jwt::run_phase(&token);
    tracing::debug!("HCP Terraform run phase: {}", phase);

    let principal = match phase {
        RunPhase::Apply => require_principal(
            config.client_id_apply.as_deref(),
            config.tenant_id_apply.as_deref(),
            "sp_client_id_apply",
            "sp_tenant_id_apply",
        )?,
        RunPhase::Plan => require_principal(
            config.client_id_plan.as_deref(),
            config.tenant_id_plan.as_deref(),
            "sp_client_id_plan",
            "sp_tenant_id_plan",
        )?,
        RunPhase::Unspecified => single_principal(config)?,
    };

    Ok(AuthStrategy::ClientAssertion {
        principal,
        assertion: AssertionKind::Workload { token, phase },
    })
}

fn single_principal(config: &AuthConfig) -> Result<ServicePrincipal> {
    require_principal(
        config.client_id.as_deref(),
        config.tenant_id.as_deref(),
        "sp_client_id",
        "sp_tenant_id",
    )
}

fn require_principal(
    client_id: Option<&str>,
    tenant_id: Option<&str>,
    client_field: &str,
    tenant_field: &str,
) -> Result<ServicePrincipal> {
    let client_id = client_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Config(format!("{} is required", client_field)))?;
    let tenant_id = tenant_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Config(format!("{} is required", tenant_field)))?;

    Ok(ServicePrincipal {
        tenant_id: tenant_id.to_string(),
        client_id: client_id.to_string(),
    })
}
