//! Signed URL minting and verification.
//!
//! URLs are signed with HMAC-SHA256 over the method, bucket, object name,
//! expiry and a per-call nonce:
//!
//! ```text
//! {base}/{bucket}/{name}?credential=..&expires=<unix>&nonce=<hex>&signature=<hex>
//! ```
//!
//! The nonce makes every URL unique, even two minted in the same second for
//! the same object. Nothing is cached: each call signs from scratch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::error::{Result, StorageError};
use super::types::{ObjectLocation, SignMethod};

type HmacSha256 = Hmac<Sha256>;

/// Characters left unescaped in a path segment (RFC 3986 unreserved).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A time-boxed URL granting one operation on one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub method: SignMethod,
    pub expires_at: DateTime<Utc>,
}

/// Query parameters carried by a signed URL.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureParams {
    pub credential: Option<String>,
    pub expires: i64,
    pub nonce: String,
    pub signature: String,
}

/// HMAC-SHA256 URL signer.
#[derive(Clone)]
pub struct HmacUrlSigner {
    base_url: String,
    credential: String,
    key: Arc<[u8]>,
}

impl std::fmt::Debug for HmacUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacUrlSigner")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl HmacUrlSigner {
    /// Creates a signer that mints URLs under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or `secret` is empty.
    pub fn new(
        base_url: &str,
        secret: impl AsRef<[u8]>,
        credential: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let parsed = url::Url::parse(base_url)
            .with_context(|| format!("Invalid signed URL base: {base_url}"))?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("Signed URL base cannot carry a path: {base_url}");
        }
        let secret = secret.as_ref();
        if secret.is_empty() {
            anyhow::bail!("Signing secret cannot be empty");
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.into(),
            key: Arc::from(secret),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Signs `method` on `location` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ttl` is out of range.
    pub fn sign(
        &self,
        location: &ObjectLocation,
        method: SignMethod,
        ttl: Duration,
    ) -> Result<SignedUrl> {
        let ttl = chrono::Duration::from_std(ttl).context("Signed URL TTL out of range")?;
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();
        let nonce = Uuid::new_v4().simple().to_string();
        let signature = self.signature(location, method, expires, &nonce)?;

        let url = format!(
            "{base}/{bucket}/{name}?credential={credential}&expires={expires}&nonce={nonce}&signature={signature}",
            base = self.base_url,
            bucket = utf8_percent_encode(&location.bucket, SEGMENT),
            name = encode_name(&location.name),
            credential = utf8_percent_encode(&self.credential, SEGMENT),
        );

        Ok(SignedUrl {
            url,
            method,
            expires_at: Utc
                .timestamp_opt(expires, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Checks a presented signature against `location` and `method`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSignature`] on mismatch and
    /// [`StorageError::Expired`] once the expiry has passed.
    pub fn verify(
        &self,
        location: &ObjectLocation,
        method: SignMethod,
        params: &SignatureParams,
    ) -> Result<()> {
        let expected = self.signature(location, method, params.expires, &params.nonce)?;
        let matches: bool = expected
            .as_bytes()
            .ct_eq(params.signature.to_ascii_lowercase().as_bytes())
            .into();
        if !matches {
            return Err(StorageError::InvalidSignature);
        }
        if Utc::now().timestamp() > params.expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }

    fn signature(
        &self,
        location: &ObjectLocation,
        method: SignMethod,
        expires: i64,
        nonce: &str,
    ) -> Result<String> {
        let payload = format!(
            "{method}\n{}\n{}\n{expires}\n{nonce}\n",
            location.bucket, location.name
        );
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| anyhow::anyhow!("Invalid signing key: {e}"))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn encode_name(name: &str) -> String {
    name.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new("http://127.0.0.1:5000/storage/", "secret", "svc@example.com").unwrap()
    }

    fn params_from(url: &str) -> SignatureParams {
        let query = url.split_once('?').unwrap().1;
        let pairs: std::collections::HashMap<String, String> =
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        SignatureParams {
            credential: pairs.get("credential").cloned(),
            expires: pairs["expires"].parse().unwrap(),
            nonce: pairs["nonce"].clone(),
            signature: pairs["signature"].clone(),
        }
    }

    #[test]
    fn test_sign_builds_url_under_base() {
        let loc = ObjectLocation::new("bucket", ".private/uploads/a b.png");
        let signed = signer()
            .sign(&loc, SignMethod::Put, Duration::from_secs(900))
            .unwrap();
        assert!(
            signed
                .url
                .starts_with("http://127.0.0.1:5000/storage/bucket/.private/uploads/a%20b.png?")
        );
        assert!(signed.url.contains("credential=svc%40example.com"));
        assert_eq!(signed.method, SignMethod::Put);
        let ttl = signed.expires_at - Utc::now();
        assert!(ttl.num_seconds() > 890 && ttl.num_seconds() <= 900);
    }

    #[test]
    fn test_every_signature_is_fresh() {
        let loc = ObjectLocation::new("bucket", "x.txt");
        let s = signer();
        let a = s.sign(&loc, SignMethod::Get, Duration::from_secs(300)).unwrap();
        let b = s.sign(&loc, SignMethod::Get, Duration::from_secs(300)).unwrap();
        assert_ne!(a.url, b.url);
    }

    #[test]
    fn test_verify_roundtrip_and_tampering() {
        let s = signer();
        let loc = ObjectLocation::new("bucket", "x.txt");
        let signed = s.sign(&loc, SignMethod::Get, Duration::from_secs(60)).unwrap();
        let params = params_from(&signed.url);

        s.verify(&loc, SignMethod::Get, &params).unwrap();

        assert!(matches!(
            s.verify(&loc, SignMethod::Put, &params),
            Err(StorageError::InvalidSignature)
        ));
        assert!(matches!(
            s.verify(&ObjectLocation::new("bucket", "y.txt"), SignMethod::Get, &params),
            Err(StorageError::InvalidSignature)
        ));

        let mut extended = params.clone();
        extended.expires += 3600;
        assert!(matches!(
            s.verify(&loc, SignMethod::Get, &extended),
            Err(StorageError::InvalidSignature)
        ));

        let other = HmacUrlSigner::new("http://127.0.0.1:5000/storage", "other", "svc").unwrap();
        assert!(matches!(
            other.verify(&loc, SignMethod::Get, &params),
            Err(StorageError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let s = signer();
        let loc = ObjectLocation::new("bucket", "x.txt");
        let expires = Utc::now().timestamp() - 10;
        let nonce = "abc".to_string();
        let params = SignatureParams {
            credential: None,
            expires,
            signature: s.signature(&loc, SignMethod::Get, expires, &nonce).unwrap(),
            nonce,
        };
        assert!(matches!(
            s.verify(&loc, SignMethod::Get, &params),
            Err(StorageError::Expired)
        ));
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(HmacUrlSigner::new("not a url", "k", "c").is_err());
        assert!(HmacUrlSigner::new("http://localhost/storage", "", "c").is_err());
    }
}
