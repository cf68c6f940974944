// Client certificate bundle parsing

use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::Path;

use super::credentials::load_secret_bytes;
use crate::error::{AuthError, Result};

/// DER encoded X.509 certificate
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// base64url SHA-256 thumbprint, as used in the `x5t#S256` JWT header
    pub fn thumbprint_sha256(&self) -> String {
        let hash = Sha256::digest(&self.der);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("thumbprint", &self.thumbprint_sha256())
            .finish()
    }
}

/// Encoding of a private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `PRIVATE KEY`
    Pkcs8,
    /// `RSA PRIVATE KEY`
    Pkcs1,
}

impl KeyFormat {
    fn pem_tag(self) -> &'static str {
        match self {
            KeyFormat::Pkcs8 => "PRIVATE KEY",
            KeyFormat::Pkcs1 => "RSA PRIVATE KEY",
        }
    }
}

/// Private key matching the leaf certificate
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    format: KeyFormat,
    der: Vec<u8>,
}

impl PrivateKey {
    pub fn new(format: KeyFormat, der: impl Into<Vec<u8>>) -> Self {
        Self {
            format,
            der: der.into(),
        }
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Re-encode the key as PEM
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(self.format.pem_tag(), self.der.clone()))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("format", &self.format)
            .field("der", &"****")
            .finish()
    }
}

/// Certificate chain plus its private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// In the order they appear in the source, leaf first
    pub certificates: Vec<Certificate>,
    pub key: PrivateKey,
}

/// Parse a client certificate bundle into its chain and private key
///
/// Accepts PEM text holding certificates and exactly one private key, or a
/// binary PKCS#12 archive. `password` decrypts PKCS#12 archives and
/// `ENCRYPTED PRIVATE KEY` blocks; it is ignored for unencrypted PEM.
pub fn parse_certificates(data: &[u8], password: Option<&str>) -> Result<CertificateBundle> {
    if is_pem(data) {
        parse_pem(data, password)
    } else {
        parse_pkcs12(data, password)
    }
}

fn is_pem(data: &[u8]) -> bool {
    const MARKER: &[u8] = b"-----BEGIN ";
    data.windows(MARKER.len()).any(|w| w == MARKER)
}

fn parse_pem(data: &[u8], password: Option<&str>) -> Result<CertificateBundle> {
    let blocks = pem::parse_many(data)
        .map_err(|e| AuthError::CertificateParse(format!("invalid PEM data: {}", e)))?;

    let mut certificates = Vec::new();
    let mut keys = Vec::new();

    for block in blocks {
        let tag = block.tag().to_string();
        match tag.as_str() {
            "CERTIFICATE" => certificates.push(Certificate::from_der(block.into_contents())),
            "PRIVATE KEY" => keys.push(PrivateKey::new(KeyFormat::Pkcs8, block.into_contents())),
            "RSA PRIVATE KEY" => {
                keys.push(PrivateKey::new(KeyFormat::Pkcs1, block.into_contents()))
            }
            "ENCRYPTED PRIVATE KEY" => keys.push(decrypt_pkcs8(block.contents(), password)?),
            other => {
                tracing::debug!("Ignoring PEM block of type {}", other);
            }
        }
    }

    if certificates.is_empty() {
        return Err(AuthError::CertificateParse(
            "no certificate found in bundle".to_string(),
        ));
    }

    if keys.len() != 1 {
        return Err(AuthError::CertificateParse(format!(
            "expected exactly one private key, found {}",
            keys.len()
        )));
    }

    Ok(CertificateBundle {
        certificates,
        key: keys.remove(0),
    })
}

/// Decrypt a PKCS#8 `EncryptedPrivateKeyInfo`
fn decrypt_pkcs8(der: &[u8], password: Option<&str>) -> Result<PrivateKey> {
    let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
        AuthError::CertificateParse(
            "private key is encrypted but no certificate password was given".to_string(),
        )
    })?;

    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(der).map_err(|e| {
        AuthError::CertificateParse(format!("invalid encrypted private key: {}", e))
    })?;
    let decrypted = encrypted.decrypt(password).map_err(|e| {
        AuthError::CertificateParse(format!("failed to decrypt private key: {}", e))
    })?;

    Ok(PrivateKey::new(KeyFormat::Pkcs8, decrypted.as_bytes()))
}

/// Read the key and chain from a PKCS#12 archive
fn parse_pkcs12(data: &[u8], password: Option<&str>) -> Result<CertificateBundle> {
    let keystore = p12_keystore::KeyStore::from_pkcs12(data, password.unwrap_or_default())
        .map_err(|e| {
            AuthError::CertificateParse(format!(
                "data is neither PEM nor a readable PKCS#12 archive: {}",
                e
            ))
        })?;

    let (alias, chain) = keystore.private_key_chain().ok_or_else(|| {
        AuthError::CertificateParse("PKCS#12 archive holds no private key".to_string())
    })?;
    tracing::debug!("Using PKCS#12 entry {}", alias);

    let certificates: Vec<Certificate> = chain
        .chain()
        .iter()
        .map(|c| Certificate::from_der(c.as_der()))
        .collect();
    if certificates.is_empty() {
        return Err(AuthError::CertificateParse(
            "no certificate found in PKCS#12 archive".to_string(),
        ));
    }

    Ok(CertificateBundle {
        certificates,
        key: PrivateKey::new(KeyFormat::Pkcs8, chain.key()),
    })
}

/// Resolve certificate bytes from an inline base64 value or a file
///
/// Whitespace in the inline value is skipped, so wrapped `base64` output
/// decodes as-is.
pub fn load_certificate(inline: Option<&str>, path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    let encoded = inline
        .map(|v| v.split_ascii_whitespace().collect::<String>())
        .filter(|v| !v.is_empty());
    if let Some(encoded) = encoded {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                AuthError::CertificateParse(format!("client certificate is not valid base64: {}", e))
            })?;
        return Ok(Some(bytes));
    }

    match path.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => load_secret_bytes(path).map(Some),
        None => Ok(None),
    }
}
