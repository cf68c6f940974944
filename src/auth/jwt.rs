// HCP Terraform run phase detection
//
// The workload identity JWT is decoded WITHOUT signature verification. The
// phase only picks which operator-configured identity to present; the
// identity provider verifies the token during the exchange. Do not use the
// decoded claims for anything else.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use super::types::RunPhase;

/// Claim carrying the run phase
pub const RUN_PHASE_CLAIM: &str = "terraform_run_phase";

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

// JWTs use base64url, but some issuers emit the standard alphabet
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Read the run phase claim from a compact JWT
///
/// Never fails: anything that cannot be decoded yields `Unspecified`.
pub fn run_phase(token: &str) -> RunPhase {
    let Some(payload) = token.split('.').nth(1) else {
        return RunPhase::Unspecified;
    };

    let Some(bytes) = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| STANDARD_LENIENT.decode(payload))
        .ok()
    else {
        return RunPhase::Unspecified;
    };

    let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return RunPhase::Unspecified;
    };

    match claims.get(RUN_PHASE_CLAIM).and_then(|v| v.as_str()) {
        Some("plan") => RunPhase::Plan,
        Some("apply") => RunPhase::Apply,
        _ => RunPhase::Unspecified,
    }
}
