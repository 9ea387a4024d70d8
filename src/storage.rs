//! Object storage for uploaded document bytes.
//!
//! The core treats storage namespaces as opaque strings; by convention keys
//! look like `{namespace}/{course_id}/{filename}`. Three backends:
//!
//! - [`FsObjectStore`] — a local directory tree.
//! - [`S3ObjectStore`] — any S3-compatible service, using the S3 REST API
//!   with AWS Signature V4 directly. Only pure-Rust crypto (`hmac`, `sha2`)
//!   is used for signing — no C library dependencies.
//! - [`MemoryObjectStore`] — in-memory map for tests.
//!
//! # S3 Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::S3StorageConfig;
use crate::error::TutorError;

type HmacSha256 = Hmac<Sha256>;

/// Blob storage contract consumed by the ingestion pipeline.
///
/// `list` returns `(name, bytes)` pairs with names relative to the prefix,
/// sorted by name for deterministic corpus assembly.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TutorError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, TutorError>;
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TutorError>;
    async fn delete(&self, key: &str) -> Result<(), TutorError>;
    async fn exists(&self, key: &str) -> Result<bool, TutorError>;
}

// ============ Filesystem backend ============

/// Stores objects as files under a root directory; keys map to relative paths.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TutorError> {
        let dir = self.root.join(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for entry in walkdir::WalkDir::new(&dir) {
            let entry = entry.map_err(|e| TutorError::ObjectStore(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(&dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(|e| TutorError::ObjectStore(e.to_string()))?;
            items.push((name, bytes));
        }

        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, TutorError> {
        tokio::fs::read(self.path_for(key))
            .await
            .map_err(|e| TutorError::ObjectStore(format!("read '{}': {}", key, e)))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TutorError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TutorError::ObjectStore(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| TutorError::ObjectStore(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), TutorError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TutorError::ObjectStore(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, TutorError> {
        Ok(self.path_for(key).exists())
    }
}

// ============ In-memory backend (tests) ============

/// In-memory store for tests; keeps objects in a map behind an `RwLock`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TutorError> {
        let objects = self.objects.read().expect("lock poisoned");
        let norm = prefix.trim_end_matches('/');
        let mut items: Vec<(String, Vec<u8>)> = objects
            .iter()
            .filter_map(|(k, v)| {
                let rest = if norm.is_empty() {
                    Some(k.as_str())
                } else {
                    k.strip_prefix(norm)
                        .map(|r| r.trim_start_matches('/'))
                        .filter(|r| !r.is_empty())
                };
                rest.map(|name| (name.to_string(), v.clone()))
            })
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, TutorError> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| TutorError::ObjectStore(format!("missing object: {}", key)))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TutorError> {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TutorError> {
        self.objects.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TutorError> {
        Ok(self
            .objects
            .read()
            .expect("lock poisoned")
            .contains_key(key))
    }
}

// ============ S3 backend ============

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self, TutorError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            TutorError::ObjectStore("AWS_ACCESS_KEY_ID environment variable not set".to_string())
        })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            TutorError::ObjectStore(
                "AWS_SECRET_ACCESS_KEY environment variable not set".to_string(),
            )
        })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// S3-compatible object store with hand-rolled SigV4 signing.
pub struct S3ObjectStore {
    config: S3StorageConfig,
    client: reqwest::Client,
}

impl S3ObjectStore {
    pub fn new(config: S3StorageConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    fn scheme(&self) -> &'static str {
        match self.config.endpoint_url {
            Some(ref e) if e.starts_with("http://") => "http",
            _ => "https",
        }
    }

    /// Full object key including the configured bucket prefix.
    fn full_key(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.config.prefix.trim_end_matches('/'), key)
        }
    }

    /// Sign and send one S3 REST request.
    ///
    /// `canonical_uri` must already be URI-encoded; `query` must be sorted
    /// by key as SigV4 requires.
    async fn send(
        &self,
        method: reqwest::Method,
        canonical_uri: &str,
        query: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response, TutorError> {
        let creds = AwsCredentials::from_env()?;
        let host = self.host();

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_querystring: String = query
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
            method.as_str(),
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        );

        let url = if canonical_querystring.is_empty() {
            format!("{}://{}{}", self.scheme(), host, canonical_uri)
        } else {
            format!(
                "{}://{}{}?{}",
                self.scheme(),
                host,
                canonical_uri,
                canonical_querystring
            )
        };

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        req.send()
            .await
            .map_err(|e| TutorError::ObjectStore(format!("S3 request failed: {}", e)))
    }

    async fn list_keys(&self, full_prefix: &str) -> Result<Vec<String>, TutorError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }
            if !full_prefix.is_empty() {
                query.push(("prefix".to_string(), full_prefix.to_string()));
            }
            // Canonical query string must be sorted by key
            query.sort_by(|a, b| a.0.cmp(&b.0));

            let resp = self
                .send(reqwest::Method::GET, "/", &query, Vec::new())
                .await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(TutorError::ObjectStore(format!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let xml = resp
                .text()
                .await
                .map_err(|e| TutorError::ObjectStore(e.to_string()))?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml);
            keys.extend(batch);

            if is_truncated {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        Ok(keys)
    }

    fn encoded_uri(key: &str) -> String {
        let encoded = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        format!("/{}", encoded)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TutorError> {
        let full_prefix = self.full_key(prefix);
        let keys = self.list_keys(&full_prefix).await?;

        let strip = format!("{}/", full_prefix.trim_end_matches('/'));
        let mut items = Vec::new();
        for key in keys {
            if key.ends_with('/') {
                continue;
            }
            let resp = self
                .send(
                    reqwest::Method::GET,
                    &Self::encoded_uri(&key),
                    &[],
                    Vec::new(),
                )
                .await?;
            if !resp.status().is_success() {
                return Err(TutorError::ObjectStore(format!(
                    "S3 GetObject failed (HTTP {}) for key '{}'",
                    resp.status(),
                    key
                )));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| TutorError::ObjectStore(e.to_string()))?;

            let name = key
                .strip_prefix(&strip)
                .unwrap_or(key.as_str())
                .to_string();
            items.push((name, bytes.to_vec()));
        }

        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, TutorError> {
        let uri = Self::encoded_uri(&self.full_key(key));
        let resp = self
            .send(reqwest::Method::GET, &uri, &[], Vec::new())
            .await?;
        if !resp.status().is_success() {
            return Err(TutorError::ObjectStore(format!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TutorError::ObjectStore(e.to_string()))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TutorError> {
        let uri = Self::encoded_uri(&self.full_key(key));
        let resp = self
            .send(reqwest::Method::PUT, &uri, &[], bytes.to_vec())
            .await?;
        if !resp.status().is_success() {
            return Err(TutorError::ObjectStore(format!(
                "S3 PutObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TutorError> {
        let uri = Self::encoded_uri(&self.full_key(key));
        let resp = self
            .send(reqwest::Method::DELETE, &uri, &[], Vec::new())
            .await?;
        // S3 returns 204 whether or not the key existed
        if !resp.status().is_success() {
            return Err(TutorError::ObjectStore(format!(
                "S3 DeleteObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TutorError> {
        let uri = Self::encoded_uri(&self.full_key(key));
        let resp = self
            .send(reqwest::Method::HEAD, &uri, &[], Vec::new())
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(TutorError::ObjectStore(format!(
                "S3 HeadObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        Ok(true)
    }
}

// ============ SigV4 helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (unreserved characters pass through).
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

/// Parse a `ListObjectsV2` XML response into object keys plus pagination state.
fn parse_list_objects_response(xml: &str) -> (Vec<String>, bool, Option<String>) {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut keys = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        if let Some(end) = remaining[block_start..].find("</Contents>") {
            let block = &remaining[block_start..block_start + end];
            if let Some(key) = extract_xml_value(block, "Key") {
                if !key.is_empty() {
                    keys.push(key);
                }
            }
            remaining = &remaining[block_start + end + "</Contents>".len()..];
        } else {
            break;
        }
    }

    (keys, is_truncated, next_token)
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    if let Some(start) = xml.find(&open) {
        let value_start = start + open.len();
        if let Some(end) = xml[value_start..].find(&close) {
            return Some(xml[value_start..value_start + end].to_string());
        }
    }
    None
}
