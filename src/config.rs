use anyhow::{Context, Result};
use clap::builder::{BoolishValueParser, TypedValueParser};
use clap::{ArgAction, CommandFactory, Parser};
use std::ffi::OsStr;
use std::path::PathBuf;

use crate::env::EnvSource;

/// Description of one provider setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingSpec {
    pub name: &'static str,
    pub env_var: &'static str,
    pub sensitive: bool,
    pub required: bool,
}

const fn setting(name: &'static str, env_var: &'static str, sensitive: bool) -> SettingSpec {
    SettingSpec {
        name,
        env_var,
        sensitive,
        required: false,
    }
}

/// Every provider setting with its environment default
pub const SETTINGS: &[SettingSpec] = &[
    setting("org_service_url", "AZDO_ORG_SERVICE_URL", false),
    setting("personal_access_token", "AZDO_PERSONAL_ACCESS_TOKEN", true),
    setting("sp_client_id", "AZDO_SP_CLIENT_ID", false),
    setting("sp_tenant_id", "AZDO_SP_TENANT_ID", false),
    setting("sp_client_id_plan", "AZDO_SP_CLIENT_ID_PLAN", false),
    setting("sp_tenant_id_plan", "AZDO_SP_TENANT_ID_PLAN", false),
    setting("sp_client_id_apply", "AZDO_SP_CLIENT_ID_APPLY", false),
    setting("sp_tenant_id_apply", "AZDO_SP_TENANT_ID_APPLY", false),
    setting("sp_client_secret", "AZDO_SP_CLIENT_SECRET", true),
    // Historical variable name, kept for existing pipelines
    setting("sp_client_secret_path", "AZDO__SP_CLIENT_SECRET_PATH", false),
    setting("sp_oidc_token", "AZDO_SP_OIDC_TOKEN", true),
    setting("sp_oidc_token_path", "AZDO_SP_OIDC_TOKEN_PATH", false),
    setting("sp_oidc_github_actions", "AZDO_SP_OIDC_GITHUB_ACTIONS", false),
    setting(
        "sp_oidc_github_actions_audience",
        "AZDO_SP_OIDC_GITHUB_ACTIONS_AUDIENCE",
        false,
    ),
    setting("sp_oidc_hcp", "AZDO_SP_OIDC_HCP", false),
    setting(
        "sp_client_certificate_path",
        "AZDO_SP_CLIENT_CERTIFICATE_PATH",
        false,
    ),
    setting("sp_client_certificate", "AZDO_SP_CLIENT_CERTIFICATE", true),
    setting(
        "sp_client_certificate_password",
        "AZDO_SP_CLIENT_CERTIFICATE_PASSWORD",
        true,
    ),
];

/// Look up a setting by name
pub fn setting_spec(name: &str) -> Option<&'static SettingSpec> {
    SETTINGS.iter().find(|s| s.name == name)
}

/// Azure DevOps provider settings
#[derive(Parser, Default)]
#[command(author, version, about, long_about = None)]
pub struct ProviderSettings {
    /// Azure DevOps organization URL
    #[arg(long, env = "AZDO_ORG_SERVICE_URL")]
    pub org_service_url: Option<String>,

    /// Personal access token
    #[arg(long, env = "AZDO_PERSONAL_ACCESS_TOKEN", hide_env_values = true)]
    pub personal_access_token: Option<String>,

    /// Service principal client id
    #[arg(long, env = "AZDO_SP_CLIENT_ID")]
    pub sp_client_id: Option<String>,

    /// Service principal tenant id
    #[arg(long, env = "AZDO_SP_TENANT_ID")]
    pub sp_tenant_id: Option<String>,

    /// Client id used during the plan phase of an HCP Terraform run
    #[arg(long, env = "AZDO_SP_CLIENT_ID_PLAN")]
    pub sp_client_id_plan: Option<String>,

    /// Tenant id used during the plan phase of an HCP Terraform run
    #[arg(long, env = "AZDO_SP_TENANT_ID_PLAN")]
    pub sp_tenant_id_plan: Option<String>,

    /// Client id used during the apply phase of an HCP Terraform run
    #[arg(long, env = "AZDO_SP_CLIENT_ID_APPLY")]
    pub sp_client_id_apply: Option<String>,

    /// Tenant id used during the apply phase of an HCP Terraform run
    #[arg(long, env = "AZDO_SP_TENANT_ID_APPLY")]
    pub sp_tenant_id_apply: Option<String>,

    /// Service principal client secret
    #[arg(long, env = "AZDO_SP_CLIENT_SECRET", hide_env_values = true)]
    pub sp_client_secret: Option<String>,

    /// Path to a file containing the client secret
    #[arg(long, env = "AZDO__SP_CLIENT_SECRET_PATH")]
    pub sp_client_secret_path: Option<String>,

    /// OIDC token to exchange
    #[arg(long, env = "AZDO_SP_OIDC_TOKEN", hide_env_values = true)]
    pub sp_oidc_token: Option<String>,

    /// Path to a file containing the OIDC token
    #[arg(long, env = "AZDO_SP_OIDC_TOKEN_PATH")]
    pub sp_oidc_token_path: Option<String>,

    /// Request the OIDC token from GitHub Actions
    #[arg(
        long,
        env = "AZDO_SP_OIDC_GITHUB_ACTIONS",
        action = ArgAction::Set,
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    pub sp_oidc_github_actions: bool,

    /// Audience requested from GitHub Actions
    #[arg(long, env = "AZDO_SP_OIDC_GITHUB_ACTIONS_AUDIENCE")]
    pub sp_oidc_github_actions_audience: Option<String>,

    /// Use the HCP Terraform workload identity token
    #[arg(
        long,
        env = "AZDO_SP_OIDC_HCP",
        action = ArgAction::Set,
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    pub sp_oidc_hcp: bool,

    /// Path to a PEM client certificate bundle
    #[arg(long, env = "AZDO_SP_CLIENT_CERTIFICATE_PATH")]
    pub sp_client_certificate_path: Option<String>,

    /// Base64 encoded PEM client certificate bundle
    #[arg(long, env = "AZDO_SP_CLIENT_CERTIFICATE", hide_env_values = true)]
    pub sp_client_certificate: Option<String>,

    /// Client certificate password
    #[arg(long, env = "AZDO_SP_CLIENT_CERTIFICATE_PASSWORD", hide_env_values = true)]
    pub sp_client_certificate_password: Option<String>,
}

impl ProviderSettings {
    /// Resolve settings from the given environment instead of the process
    ///
    /// Flags go through the same value parser as the process environment,
    /// so a value rejected there is rejected here too.
    pub fn from_env_source(env: &dyn EnvSource) -> Result<Self> {
        let mut command = Self::command();
        command.build();
        let var = |name: &str| setting_spec(name).and_then(|s| env.var(s.env_var));
        let flag = |name: &str| -> Result<bool> {
            let Some(value) = var(name) else {
                return Ok(false);
            };
            let arg = command
                .get_arguments()
                .find(|a| a.get_id().as_str() == name);
            BoolishValueParser::new()
                .parse_ref(&command, arg, OsStr::new(&value))
                .with_context(|| format!("Invalid value {:?} for {}", value, name))
        };

        Ok(Self {
            org_service_url: var("org_service_url"),
            personal_access_token: var("personal_access_token"),
            sp_client_id: var("sp_client_id"),
            sp_tenant_id: var("sp_tenant_id"),
            sp_client_id_plan: var("sp_client_id_plan"),
            sp_tenant_id_plan: var("sp_tenant_id_plan"),
            sp_client_id_apply: var("sp_client_id_apply"),
            sp_tenant_id_apply: var("sp_tenant_id_apply"),
            sp_client_secret: var("sp_client_secret"),
            sp_client_secret_path: var("sp_client_secret_path"),
            sp_oidc_token: var("sp_oidc_token"),
            sp_oidc_token_path: var("sp_oidc_token_path"),
            sp_oidc_github_actions: flag("sp_oidc_github_actions")?,
            sp_oidc_github_actions_audience: var("sp_oidc_github_actions_audience"),
            sp_oidc_hcp: flag("sp_oidc_hcp")?,
            sp_client_certificate_path: var("sp_client_certificate_path"),
            sp_client_certificate: var("sp_client_certificate"),
            sp_client_certificate_password: var("sp_client_certificate_password"),
        })
    }
}

/// Resolved authentication inputs
///
/// Empty strings are normalized to `None`. At most one authentication
/// strategy is used even when several are populated; see
/// [`crate::auth::select_strategy`] for the order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub org_service_url: Option<String>,
    pub personal_access_token: Option<String>,

    // Single identity
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,

    // HCP Terraform phase identities
    pub client_id_plan: Option<String>,
    pub tenant_id_plan: Option<String>,
    pub client_id_apply: Option<String>,
    pub tenant_id_apply: Option<String>,

    pub client_secret: Option<String>,
    pub client_secret_path: Option<PathBuf>,

    pub oidc_token: Option<String>,
    pub oidc_token_path: Option<PathBuf>,
    pub oidc_github_actions: bool,
    pub oidc_github_actions_audience: Option<String>,
    pub oidc_hcp: bool,

    pub client_certificate: Option<String>,
    pub client_certificate_path: Option<PathBuf>,
    pub client_certificate_password: Option<String>,
}

impl AuthConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let settings = ProviderSettings::try_parse_from(["azdo-auth"])
            .context("Failed to resolve provider settings from the environment")?;

        Ok(settings.into())
    }

    /// Load configuration from the given environment
    pub fn from_env_source(env: &dyn EnvSource) -> Result<Self> {
        Ok(ProviderSettings::from_env_source(env)?.into())
    }
}

impl From<ProviderSettings> for AuthConfig {
    fn from(s: ProviderSettings) -> Self {
        Self {
            org_service_url: non_empty(s.org_service_url),
            personal_access_token: non_empty(s.personal_access_token),
            client_id: non_empty(s.sp_client_id),
            tenant_id: non_empty(s.sp_tenant_id),
            client_id_plan: non_empty(s.sp_client_id_plan),
            tenant_id_plan: non_empty(s.sp_tenant_id_plan),
            client_id_apply: non_empty(s.sp_client_id_apply),
            tenant_id_apply: non_empty(s.sp_tenant_id_apply),
            client_secret: non_empty(s.sp_client_secret),
            client_secret_path: non_empty(s.sp_client_secret_path).map(|p| home_relative(&p)),
            oidc_token: non_empty(s.sp_oidc_token),
            oidc_token_path: non_empty(s.sp_oidc_token_path).map(|p| home_relative(&p)),
            oidc_github_actions: s.sp_oidc_github_actions,
            oidc_github_actions_audience: non_empty(s.sp_oidc_github_actions_audience),
            oidc_hcp: s.sp_oidc_hcp,
            client_certificate: non_empty(s.sp_client_certificate),
            client_certificate_path: non_empty(s.sp_client_certificate_path)
                .map(|p| home_relative(&p)),
            client_certificate_password: non_empty(s.sp_client_certificate_password),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("org_service_url", &self.org_service_url)
            .field("personal_access_token", &redact(&self.personal_access_token))
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id_plan", &self.client_id_plan)
            .field("tenant_id_plan", &self.tenant_id_plan)
            .field("client_id_apply", &self.client_id_apply)
            .field("tenant_id_apply", &self.tenant_id_apply)
            .field("client_secret", &redact(&self.client_secret))
            .field("client_secret_path", &self.client_secret_path)
            .field("oidc_token", &redact(&self.oidc_token))
            .field("oidc_token_path", &self.oidc_token_path)
            .field("oidc_github_actions", &self.oidc_github_actions)
            .field(
                "oidc_github_actions_audience",
                &self.oidc_github_actions_audience,
            )
            .field("oidc_hcp", &self.oidc_hcp)
            .field("client_certificate", &redact(&self.client_certificate))
            .field("client_certificate_path", &self.client_certificate_path)
            .field(
                "client_certificate_password",
                &redact(&self.client_certificate_password),
            )
            .finish()
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "****")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `~/...` paths resolve against the home directory; others are kept
fn home_relative(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
