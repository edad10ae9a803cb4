//! External image hosting
//!
//! Patient images are not stored locally: they are forwarded to a hosted
//! image service and only the returned `(public_id, url)` pair is kept.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ImageHostConfig;
use crate::models::HostedImage;

#[derive(Debug, Error)]
pub enum ImageHostError {
    #[error("image host is not configured")]
    NotConfigured,
    #[error("request to image host failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image host rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// An image received from a client, ready to forward
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<HostedImage, ImageHostError>;
    async fn destroy(&self, public_id: &str) -> Result<(), ImageHostError>;
}

/// Pick the host described by `config`
pub fn from_config(config: &ImageHostConfig) -> Arc<dyn ImageHost> {
    if config.is_configured() {
        info!(cloud = %config.cloud_name, folder = %config.folder, "image host configured");
        Arc::new(CloudinaryHost::new(config.clone()))
    } else {
        warn!("image host credentials missing, uploads are disabled");
        Arc::new(UnconfiguredHost)
    }
}

/// Stand-in used when no credentials are set; every call fails
#[derive(Debug, Default)]
pub struct UnconfiguredHost;

#[async_trait]
impl ImageHost for UnconfiguredHost {
    async fn upload(&self, _image: ImageUpload) -> Result<HostedImage, ImageHostError> {
        Err(ImageHostError::NotConfigured)
    }

    async fn destroy(&self, _public_id: &str) -> Result<(), ImageHostError> {
        Err(ImageHostError::NotConfigured)
    }
}

/// Signed uploads against the Cloudinary REST API
#[derive(Debug)]
pub struct CloudinaryHost {
    config: ImageHostConfig,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

impl CloudinaryHost {
    pub fn new(config: ImageHostConfig) -> Self {
        let base_url = format!("https://api.cloudinary.com/v1_1/{}/image", config.cloud_name);
        CloudinaryHost {
            config,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Fields common to every signed call, signature included
    fn signed_fields(&self, mut params: BTreeMap<&'static str, String>) -> BTreeMap<&'static str, String> {
        params.insert("timestamp", chrono::Utc::now().timestamp().to_string());
        let signature = sign(&params, &self.config.api_secret);
        params.insert("signature", signature);
        params.insert("signature_algorithm", "sha256".to_string());
        params.insert("api_key", self.config.api_key.clone());
        params
    }

    async fn send(&self, endpoint: &str, form: Form) -> Result<reqwest::Response, ImageHostError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        Err(ImageHostError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: ImageUpload) -> Result<HostedImage, ImageHostError> {
        let mut params = BTreeMap::new();
        params.insert("folder", self.config.folder.clone());

        let file = Part::bytes(image.data.to_vec())
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;

        let form = self
            .signed_fields(params)
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .part("file", file);

        let uploaded: UploadResponse = self.send("upload", form).await?.json().await?;
        info!(public_id = %uploaded.public_id, "image uploaded");

        Ok(HostedImage {
            public_id: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), ImageHostError> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());

        let form = self
            .signed_fields(params)
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value));

        let destroyed: DestroyResponse = self.send("destroy", form).await?.json().await?;
        match destroyed.result.as_str() {
            "ok" => info!(public_id, "image destroyed"),
            // Already gone on the host side
            "not found" => warn!(public_id, "image was not found on host"),
            other => {
                return Err(ImageHostError::Rejected {
                    status: 200,
                    message: format!("unexpected destroy result: {}", other),
                })
            }
        }
        Ok(())
    }
}

/// `sha256("k1=v1&k2=v2" + secret)` over the parameters sorted by name
fn sign(params: &BTreeMap<&'static str, String>, secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{}{}", to_sign, secret).as_bytes());
    format!("{:x}", digest)
}
