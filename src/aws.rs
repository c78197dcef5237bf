//! AWS credentials and Signature Version 4 request signing.
//!
//! Both managed services the tracker talks to (S3 for the document catalog,
//! Bedrock Agent Runtime for retrieve-and-generate) are called through their
//! REST APIs with requests signed here.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing, no
//! C library dependencies like `aws-lc-sys`.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).with_context(|| format!("{} is not set", name))
        };
        Ok(Self::new(
            var("AWS_ACCESS_KEY_ID")?,
            var("AWS_SECRET_ACCESS_KEY")?,
            std::env::var("AWS_SESSION_TOKEN").ok(),
        ))
    }
}

/// Base URL and signing host for a service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Scheme and authority, no trailing slash (e.g. `https://s3.eu-west-3.amazonaws.com`).
    pub base_url: String,
    /// Value of the signed `host` header.
    pub host: String,
}

impl Endpoint {
    /// Parse a custom endpoint URL. A missing scheme means `https`.
    pub fn parse(url: &str) -> Self {
        let trimmed = url.trim_end_matches('/');
        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("https", trimmed),
        };
        let host = rest.split('/').next().unwrap_or(rest).to_string();
        Self {
            base_url: format!("{}://{}", scheme, host),
            host,
        }
    }

    pub fn https(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            base_url: format!("https://{}", host),
            host,
        }
    }
}

/// The parts of an HTTP request that SigV4 covers.
pub struct SigningInput<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Already URI-encoded path, starting with `/`.
    pub canonical_uri: &'a str,
    /// Already sorted and encoded, see [`canonical_query`].
    pub canonical_query: &'a str,
    pub payload: &'a [u8],
    pub region: &'a str,
    pub service: &'a str,
}

/// Sign a request and return the headers to attach to it
/// (`Authorization`, `x-amz-date`, `x-amz-content-sha256`, and the
/// session token when present).
pub fn sign_request(
    creds: &AwsCredentials,
    input: &SigningInput<'_>,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(input.payload);

    let mut headers = vec![
        ("host".to_string(), input.host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        input.canonical_uri,
        input.canonical_query,
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, input.region, input.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &creds.secret_access_key,
        &date_stamp,
        input.region,
        input.service,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    let mut out = vec![
        ("Authorization".to_string(), authorization),
        ("x-amz-content-sha256".to_string(), payload_hash),
        ("x-amz-date".to_string(), amz_date),
    ];
    if let Some(ref token) = creds.session_token {
        out.push(("x-amz-security-token".to_string(), token.clone()));
    }
    out
}

/// Build a canonical query string: parameters sorted by name, names and
/// values URI-encoded.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex SHA-256 digest, as used for payload hashes.
pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Chain HMACs over the credential scope, starting from `"AWS4" + secret`.
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let seed = format!("AWS4{}", secret_key).into_bytes();
    [date_stamp, region, service, "aws4_request"]
        .iter()
        .fold(seed, |key, part| hmac_sha256(&key, part.as_bytes()))
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn uri_encode(s: &str) -> String {
    s.bytes().fold(String::with_capacity(s.len()), |mut out, byte| {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_signing_key_matches_aws_example() {
        // From the AWS "Examples of how to derive a signing key" page.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("Acme_Berlin.pdf"), "Acme_Berlin.pdf");
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(uri_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_canonical_query_sorted() {
        let q = canonical_query(&[
            ("max-keys".to_string(), "1000".to_string()),
            ("continuation-token".to_string(), "a+b=".to_string()),
            ("list-type".to_string(), "2".to_string()),
        ]);
        assert_eq!(q, "continuation-token=a%2Bb%3D&list-type=2&max-keys=1000");
    }

    #[test]
    fn test_endpoint_parse() {
        let e = Endpoint::parse("http://127.0.0.1:9000/");
        assert_eq!(e.base_url, "http://127.0.0.1:9000");
        assert_eq!(e.host, "127.0.0.1:9000");

        let e = Endpoint::parse("minio.local");
        assert_eq!(e.base_url, "https://minio.local");
        assert_eq!(e.host, "minio.local");
    }

    #[test]
    fn test_sign_request_headers() {
        let creds = AwsCredentials::new("AKID", "secret", Some("token".to_string()));
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let headers = sign_request(
            &creds,
            &SigningInput {
                method: "GET",
                host: "projectstracker.s3.eu-west-3.amazonaws.com",
                canonical_uri: "/",
                canonical_query: "list-type=2",
                payload: b"",
                region: "eu-west-3",
                service: "s3",
            },
            now,
        );

        let get = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        let auth = get("Authorization");
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKID/20240307/eu-west-3/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token, Signature="
        ));
        assert_eq!(get("x-amz-date"), "20240307T120000Z");
        assert_eq!(get("x-amz-security-token"), "token");

        // Deterministic for identical input.
        let again = sign_request(
            &creds,
            &SigningInput {
                method: "GET",
                host: "projectstracker.s3.eu-west-3.amazonaws.com",
                canonical_uri: "/",
                canonical_query: "list-type=2",
                payload: b"",
                region: "eu-west-3",
                service: "s3",
            },
            now,
        );
        assert_eq!(headers, again);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = AwsCredentials::new("AKID", "supersecret", None);
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("AKID"));
        assert!(!dbg.contains("supersecret"));
    }
}
