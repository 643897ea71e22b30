//! The S3-compatible backend. Requests are authenticated with presigned
//! URLs; transient failures are retried with backoff.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use rusty_s3::actions::{ListObjectsV2, S3Action};
use rusty_s3::{Bucket, Credentials, UrlStyle};
use sha2::{Digest, Sha256};

use gitvault_core::config::{PayloadSignatureMode, RetrySettings, StorageSettings};
use gitvault_core::error::{Result, VaultError};
use gitvault_core::storage::ObjectStorage;

use crate::archive::{self, BuiltArchive};
use crate::retry::{retry_call, HttpRetryError};

/// Validity window for presigned request URLs.
const PRESIGN_DURATION: Duration = Duration::from_secs(3600);

/// Sidecar object recording the content hash of the most recent archive at
/// a repository prefix. Consulted to suppress uploads of unchanged content.
const CONTENT_HASH_SIDECAR: &str = ".archive-sha256";

#[derive(Debug)]
pub struct S3Storage {
    bucket: Bucket,
    credentials: Credentials,
    agent: ureq::Agent,
    retry: RetrySettings,
    signature_mode: PayloadSignatureMode,
    always_content_md5: bool,
}

impl S3Storage {
    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        let base_url = settings.endpoint.parse().map_err(|e| {
            VaultError::Config(format!(
                "invalid storage endpoint '{}': {e}",
                settings.endpoint
            ))
        })?;
        let url_style = if settings.force_path_style {
            UrlStyle::Path
        } else {
            UrlStyle::VirtualHost
        };
        let bucket = Bucket::new(
            base_url,
            url_style,
            settings.bucket.clone(),
            settings.region.clone(),
        )
        .map_err(|e| VaultError::Config(format!("failed to create S3 bucket handle: {e}")))?;

        let credentials =
            Credentials::new(&settings.access_key_id, &settings.secret_access_key);

        let mut signature_mode = settings.payload_signature_mode;
        if signature_mode == PayloadSignatureMode::Streaming {
            tracing::warn!(
                "streaming payload signing is not available with presigned requests; \
                 treating payloadSignatureMode as 'unsigned'"
            );
            signature_mode = PayloadSignatureMode::Unsigned;
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300))
            .build();

        Ok(Self {
            bucket,
            credentials,
            agent,
            retry: settings.retry.clone(),
            signature_mode,
            always_content_md5: settings.always_calculate_content_md5,
        })
    }

    fn storage_err(op: &str, key: &str, e: impl std::fmt::Display) -> VaultError {
        VaultError::Storage(format!("S3 {op} {key}: {e}"))
    }

    fn apply_payload_headers(
        &self,
        request: ureq::Request,
        sha256_hex: &str,
        md5_base64: Option<&str>,
    ) -> ureq::Request {
        let request = match self.signature_mode {
            PayloadSignatureMode::Full => request.set("x-amz-content-sha256", sha256_hex),
            PayloadSignatureMode::Streaming | PayloadSignatureMode::Unsigned => {
                request.set("x-amz-content-sha256", "UNSIGNED-PAYLOAD")
            }
        };
        match md5_base64 {
            Some(md5) if self.always_content_md5 => request.set("Content-MD5", md5),
            _ => request,
        }
    }

    fn put_bytes(&self, key: &str, data: &[u8]) -> Result<()> {
        let url = self
            .bucket
            .put_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        let sha256_hex = hex::encode(Sha256::digest(data));
        let md5_base64 = if self.always_content_md5 {
            use base64::Engine;
            use md5::Md5;
            Some(base64::engine::general_purpose::STANDARD.encode(Md5::digest(data)))
        } else {
            None
        };

        retry_call(&self.retry, &format!("PUT {key}"), || {
            let request = self.apply_payload_headers(
                self.agent.put(url.as_str()),
                &sha256_hex,
                md5_base64.as_deref(),
            );
            request
                .send_bytes(data)
                .map(|_| ())
                .map_err(HttpRetryError::http)
        })
        .map_err(|e| Self::storage_err("PUT", key, e))
    }

    fn put_archive(&self, key: &str, built: &BuiltArchive) -> Result<()> {
        let url = self
            .bucket
            .put_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);

        retry_call(&self.retry, &format!("PUT {key}"), || {
            // Re-opened per attempt so a retry streams from the start.
            let file = File::open(built.file.path()).map_err(HttpRetryError::Io)?;
            let request = self
                .agent
                .put(url.as_str())
                .set("Content-Length", &built.size.to_string())
                .set("Content-Type", "application/gzip");
            let request = self.apply_payload_headers(
                request,
                &built.sha256_hex,
                Some(&built.md5_base64),
            );
            request.send(file).map(|_| ()).map_err(HttpRetryError::http)
        })
        .map_err(|e| Self::storage_err("PUT", key, e))
    }

    fn delete_one(&self, key: &str) -> Result<()> {
        let url = self
            .bucket
            .delete_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        retry_call(&self.retry, &format!("DELETE {key}"), || {
            self.agent
                .delete(url.as_str())
                .call()
                .map(|_| ())
                .map_err(HttpRetryError::http)
        })
        .map_err(|e| Self::storage_err("DELETE", key, e))
    }
}

/// Key of the content-hash sidecar next to an archive key.
fn sidecar_key(archive_key: &str) -> String {
    match archive_key.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/{CONTENT_HASH_SIDECAR}"),
        None => CONTENT_HASH_SIDECAR.to_string(),
    }
}

impl ObjectStorage for S3Storage {
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        let url = self
            .bucket
            .get_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);

        retry_call(&self.retry, &format!("GET {key}"), || {
            match self.agent.get(url.as_str()).call() {
                Ok(response) => {
                    let mut body = String::new();
                    response
                        .into_reader()
                        .read_to_string(&mut body)
                        .map_err(HttpRetryError::Io)?;
                    Ok(Some(body))
                }
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(e) => Err(HttpRetryError::http(e)),
            }
        })
        .map_err(|e| Self::storage_err("GET", key, e))
    }

    fn put_text(&self, key: &str, body: &str) -> Result<()> {
        self.put_bytes(key, body.as_bytes())
    }

    fn upload_dir_as_tar_gz(&self, local_path: &Path, key: &str) -> Result<()> {
        let built = archive::build_tar_gz(local_path)?;

        let sidecar = sidecar_key(key);
        if let Some(prior) = self.get_text(&sidecar)? {
            if prior.trim() == built.sha256_hex {
                tracing::info!(key, "archive content unchanged, suppressing upload");
                return Ok(());
            }
        }

        tracing::debug!(key, size = built.size, "uploading archive");
        self.put_archive(key, &built)?;
        self.put_bytes(&sidecar, built.sha256_hex.as_bytes())?;
        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.delete_one(key)?;
        }
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let keys = self.list_keys(prefix)?;
        self.delete_objects(&keys)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
            action.query_mut().insert("prefix", prefix);
            if let Some(ref token) = continuation_token {
                action.query_mut().insert("continuation-token", token);
            }
            let url = action.sign(PRESIGN_DURATION);

            let parsed = retry_call(&self.retry, &format!("LIST {prefix}"), || {
                let response = self
                    .agent
                    .get(url.as_str())
                    .call()
                    .map_err(HttpRetryError::http)?;
                let mut body = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut body)
                    .map_err(HttpRetryError::Io)?;
                let body_str = std::str::from_utf8(&body).map_err(|e| {
                    HttpRetryError::Permanent(format!("failed to parse list response: {e}"))
                })?;
                ListObjectsV2::parse_response(body_str).map_err(|e| {
                    HttpRetryError::Permanent(format!("failed to parse list response: {e}"))
                })
            })
            .map_err(|e| Self::storage_err("LIST", prefix, e))?;

            for object in &parsed.contents {
                if !object.key.ends_with('/') {
                    keys.push(object.key.clone());
                }
            }

            match parsed.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }
}
