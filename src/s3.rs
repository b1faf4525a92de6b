//! Amazon S3 [`ObjectStore`].
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication:
//! `ListObjectsV2` (paginated), `GetObject`, `PutObject` and `DeleteObject`.
//! Uploads request server-side encryption (`AES256`).
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)
//!
//! # Addressing
//!
//! Without `endpoint_url` requests go to
//! `https://<bucket>.s3.<region>.amazonaws.com/<key>`. With a custom
//! endpoint (MinIO, LocalStack) path-style addressing is used:
//! `<endpoint>/<bucket>/<key>`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};

use related_index_core::objects::{ObjectInfo, ObjectStore};

use crate::config::MirrorConfig;

type HmacSha256 = Hmac<Sha256>;

// ============ AWS Credentials ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Store ============

pub struct S3ObjectStore {
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3ObjectStore {
    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        Ok(Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
            creds: AwsCredentials::from_env()?,
            client: reqwest::Client::new(),
        })
    }

    /// Send a signed request for `key` (empty for bucket-level calls).
    async fn send(
        &self,
        method: Method,
        key: &str,
        query_params: &[(String, String)],
        body: Vec<u8>,
        extra_headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let (scheme, host) = s3_host(&self.bucket, &self.region, self.endpoint_url.as_deref());
        let canonical_uri = object_path(&self.bucket, self.endpoint_url.is_some(), key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut sorted_params = query_params.to_vec();
        sorted_params.sort();
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        for (name, value) in extra_headers {
            headers.push((name.to_ascii_lowercase(), value.to_string()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.creds.secret_access_key, &date_stamp, &self.region, "s3")?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let has_body = method == Method::PUT;
        let mut url = format!("{}://{}{}", scheme, host, canonical_uri);
        if !canonical_querystring.is_empty() {
            url.push('?');
            url.push_str(&canonical_querystring);
        }

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = self.creds.session_token {
            request = request.header("x-amz-security-token", token);
        }
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }
        if has_body {
            request = request.body(body);
        }

        request
            .send()
            .await
            .with_context(|| format!("S3 request failed for s3://{}/{}", self.bucket, key))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let resp = self
            .send(
                Method::PUT,
                key,
                &[],
                body,
                &[("x-amz-server-side-encryption", "AES256")],
            )
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                text.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query_params = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query_params.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(ref token) = continuation_token {
                query_params.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.send(Method::GET, "", &query_params, Vec::new(), &[]).await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                );
            }

            let xml_body = resp.text().await?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml_body);
            objects.extend(batch);

            match (is_truncated, next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let resp = self.send(Method::DELETE, key, &[], Vec::new(), &[]).await?;
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            bail!("S3 DeleteObject failed (HTTP {}) for key '{}'", status, key);
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self.send(Method::GET, key, &[], Vec::new(), &[]).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", status, key);
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

// ============ AWS SigV4 Helpers ============

/// Scheme and host for a request.
fn s3_host(bucket: &str, region: &str, endpoint_url: Option<&str>) -> (&'static str, String) {
    match endpoint_url {
        Some(endpoint) => {
            let scheme = if endpoint.starts_with("http://") {
                "http"
            } else {
                "https"
            };
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string();
            (scheme, host)
        }
        None => ("https", format!("{}.s3.{}.amazonaws.com", bucket, region)),
    }
}

/// Canonical URI for `key`; path-style requests carry the bucket first.
fn object_path(bucket: &str, path_style: bool, key: &str) -> String {
    let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
    match (path_style, key.is_empty()) {
        (true, true) => format!("/{}", uri_encode(bucket)),
        (true, false) => format!("/{}/{}", uri_encode(bucket), encoded_key),
        (false, _) => format!("/{}", encoded_key),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|_| anyhow!("invalid HMAC key length"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per RFC 3986, leaving `A-Z a-z 0-9 - _ . ~` as-is.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing (minimal, no extra deps) ============

/// Parse a `ListObjectsV2` response: objects, truncation flag, next token.
fn parse_list_objects_response(xml: &str) -> (Vec<ObjectInfo>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }
        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        objects.push(ObjectInfo {
            key: xml_unescape(&key),
            size,
        });
    }

    (objects, is_truncated, next_token)
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
