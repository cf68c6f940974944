// Authentication module
// Strategy selection, credential loading and token exchange

mod certificate;
mod credentials;
mod exchange;
mod federation;
mod identity;
mod jwt;
mod manager;
mod selector;
mod types;

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, Result};

pub use certificate::{
    load_certificate, parse_certificates, Certificate, CertificateBundle, KeyFormat, PrivateKey,
};
pub use credentials::{load_secret, load_secret_bytes};
pub use exchange::JWT_BEARER_ASSERTION_TYPE;
pub use federation::{
    fetch_github_oidc_token, github_audience, GitHubActionsAssertion, StaticAssertion,
    DEFAULT_GITHUB_AUDIENCE,
};
pub use identity::{
    AssertionSource, EntraIdentity, IdentityFactory, TokenGetter, DEFAULT_AUTHORITY_HOST,
};
pub use jwt::{run_phase, RUN_PHASE_CLAIM};
pub use manager::{get_auth_token, AuthResolver};
pub use selector::select_strategy;
pub use types::{
    AccessToken, AssertionKind, AuthStrategy, RunPhase, ServicePrincipal, TokenRequestOptions,
    AZURE_DEVOPS_SCOPE,
};

/// Run a network future, abandoning it if the caller cancels
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(AuthError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = fut => result,
    }
}
