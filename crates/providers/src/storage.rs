//! Object storage uploads implementing the engine's [`ObjectStore`]
//! contract: [`GcsStore`] against the Google Cloud Storage JSON API and
//! [`S3Store`] against the S3 REST API with SigV4 request signing.

use std::{env, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use clipflow_engine::collab::ObjectStore;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;
use uuid::Uuid;

const UPLOAD_BASE_URL: &str = "https://storage.googleapis.com/upload/storage/v1";

type HmacSha256 = Hmac<Sha256>;

/// Uploads byte buffers to a GCS bucket as publicly readable objects.
#[derive(Debug, Clone)]
pub struct GcsStore {
    http: Client,
    bucket: String,
    token: String,
}

impl GcsStore {
    /// Construct a store from `CLIPFLOW_GCS_BUCKET` and `GOOGLE_OAUTH_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("CLIPFLOW_GCS_BUCKET").map_err(|_| anyhow!("CLIPFLOW_GCS_BUCKET is not set"))?;
        let token = env::var("GOOGLE_OAUTH_TOKEN").map_err(|_| anyhow!("GOOGLE_OAUTH_TOKEN is not set"))?;
        Self::new(bucket, token)
    }

    pub fn new(bucket: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            bucket: bucket.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn upload(&self, data: &[u8], object_name: Option<&str>) -> Result<String> {
        let object_name = match object_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("object-{}", Uuid::new_v4()),
        };
        debug!(bucket = %self.bucket, object = %object_name, size = data.len(), "uploading object");

        let response = self
            .http
            .post(format!("{UPLOAD_BASE_URL}/b/{}/o", self.bucket))
            .query(&[
                ("uploadType", "media"),
                ("name", object_name.as_str()),
                ("predefinedAcl", "publicRead"),
            ])
            .bearer_auth(&self.token)
            .header("Content-Type", "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .context("upload object")?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("object upload failed: {detail}");
        }

        Ok(format!("https://storage.googleapis.com/{}/{}", self.bucket, object_name))
    }
}

/// Uploads byte buffers to an S3 bucket as publicly readable objects.
///
/// Requests are signed with SigV4 directly; only `PutObject` is needed, so
/// the full SDK surface is not.
#[derive(Debug, Clone)]
pub struct S3Store {
    http: Client,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
    endpoint: String,
}

impl S3Store {
    /// Construct a store from `CLIPFLOW_S3_BUCKET`, `AWS_ACCESS_KEY_ID`,
    /// and `AWS_SECRET_ACCESS_KEY`. `AWS_REGION` defaults to `us-east-1`.
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("CLIPFLOW_S3_BUCKET").map_err(|_| anyhow!("CLIPFLOW_S3_BUCKET is not set"))?;
        let access_key = env::var("AWS_ACCESS_KEY_ID").map_err(|_| anyhow!("AWS_ACCESS_KEY_ID is not set"))?;
        let secret_key = env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| anyhow!("AWS_SECRET_ACCESS_KEY is not set"))?;
        let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        Self::new(bucket, region, access_key, secret_key)
    }

    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let region = region.into();
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build http client")?;
        let endpoint = format!("https://{bucket}.s3.{region}.amazonaws.com");
        Ok(Self {
            http,
            bucket,
            region,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            endpoint,
        })
    }

    /// Point the store at a custom endpoint instead of the bucket's
    /// virtual-hosted AWS URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, data: &[u8], object_name: Option<&str>) -> Result<String> {
        let object_name = match object_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("object-{}", Uuid::new_v4()),
        };
        let key = uri_encode(&object_name);
        debug!(bucket = %self.bucket, object = %object_name, size = data.len(), "uploading object");

        let endpoint = Url::parse(&self.endpoint).context("invalid s3 endpoint")?;
        let host_name = endpoint.host_str().ok_or_else(|| anyhow!("s3 endpoint has no host"))?;
        let host = match endpoint.port() {
            Some(port) => format!("{host_name}:{port}"),
            None => host_name.to_string(),
        };

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex(Sha256::digest(data).as_slice());

        // Header names must be lowercase and sorted for canonicalization.
        let headers = [
            ("host".to_string(), host),
            ("x-amz-acl".to_string(), "public-read".to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        let canonical_uri = format!("/{key}");
        let canonical = canonical_request("PUT", &canonical_uri, "", &headers, &payload_hash);
        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let to_sign = string_to_sign(&amz_date, &scope, &canonical);
        let key_material = signing_key(&self.secret_key, &date, &self.region, "s3")?;
        let signature = hex(&hmac_sign(&key_material, to_sign.as_bytes())?);
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            self.access_key,
            signed_headers(&headers),
        );

        let response = self
            .http
            .put(format!("{}/{key}", self.endpoint))
            .header("Authorization", authorization)
            .header("x-amz-acl", "public-read")
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .body(data.to_vec())
            .send()
            .await
            .context("upload object")?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("object upload failed: {detail}");
        }

        Ok(format!("{}/{key}", self.endpoint))
    }
}

/// Percent-encode an object key per the SigV4 rules, keeping `/` intact.
fn uri_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn canonical_request(method: &str, uri: &str, query: &str, headers: &[(String, String)], payload_hash: &str) -> String {
    let canonical_headers: String = headers.iter().map(|(name, value)| format!("{name}:{value}\n")).collect();
    format!(
        "{method}\n{uri}\n{query}\n{canonical_headers}\n{}\n{payload_hash}",
        signed_headers(headers)
    )
}

fn signed_headers(headers: &[(String, String)]) -> String {
    headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(";")
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex(Sha256::digest(canonical_request.as_bytes()).as_slice())
    )
}

/// Derive the per-day signing key: HMAC chain over date, region, service.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sign(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sign(&k_date, region.as_bytes())?;
    let k_service = hmac_sign(&k_region, service.as_bytes())?;
    hmac_sign(&k_service, b"aws4_request")
}

fn hmac_sign(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| anyhow!("invalid hmac key length"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn from_env_requires_bucket_and_token() {
        temp_env::with_vars_unset(["CLIPFLOW_GCS_BUCKET", "GOOGLE_OAUTH_TOKEN"], || {
            assert!(GcsStore::from_env().is_err());
        });
    }

    #[test]
    fn s3_from_env_requires_bucket_and_credentials() {
        temp_env::with_vars_unset(["CLIPFLOW_S3_BUCKET", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"], || {
            assert!(S3Store::from_env().is_err());
        });
    }

    #[test]
    fn object_keys_are_percent_encoded_with_slashes_kept() {
        assert_eq!(uri_encode("clips/final cut.mp4"), "clips/final%20cut.mp4");
        assert_eq!(uri_encode("a+b=c"), "a%2Bb%3Dc");
    }

    // Vectors from the published SigV4 signing walkthrough.
    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn signing_key_matches_the_published_derivation() {
        let key = signing_key(EXAMPLE_SECRET, "20150830", "us-east-1", "iam").unwrap();
        assert_eq!(hex(&key), "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9");
    }

    #[test]
    fn signature_matches_the_published_request_example() {
        let headers = [
            (
                "content-type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            ),
            ("host".to_string(), "iam.amazonaws.com".to_string()),
            ("x-amz-date".to_string(), "20150830T123600Z".to_string()),
        ];
        let payload_hash = hex(Sha256::digest(b"").as_slice());
        let canonical = canonical_request("GET", "/", "Action=ListUsers&Version=2010-05-08", &headers, &payload_hash);
        let to_sign = string_to_sign("20150830T123600Z", "20150830/us-east-1/iam/aws4_request", &canonical);

        let key = signing_key(EXAMPLE_SECRET, "20150830", "us-east-1", "iam").unwrap();
        let signature = hex(&hmac_sign(&key, to_sign.as_bytes()).unwrap());
        assert_eq!(signature, "5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7");
    }

    #[tokio::test]
    async fn s3_upload_puts_a_signed_public_object() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/clip.mp4"))
            .and(header("x-amz-acl", "public-read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let store = S3Store::new("demo-bucket", "us-east-1", "AKIDEXAMPLE", EXAMPLE_SECRET)
            .unwrap()
            .with_endpoint(server.uri());
        let url = store.upload(b"clip-bytes", Some("clip.mp4")).await.expect("upload");
        assert_eq!(url, format!("{}/clip.mp4", server.uri()));

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").expect("authorization header");
        assert!(auth.to_str().unwrap().starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    }
}
