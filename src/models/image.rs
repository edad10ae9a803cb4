use serde::{Deserialize, Serialize};

use crate::storage::Document;

/// Where the image host keeps an uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedImage {
    pub public_id: String,
    pub url: String,
}

/// An image attached to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "pId")]
    pub patient_id: String,
    pub image: HostedImage,
}

impl Document for ImageRecord {
    fn id(&self) -> &str {
        &self.id
    }
}
