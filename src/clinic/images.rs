use tracing::{error, info};

use super::ClinicService;
use crate::error::{ClinicError, Result};
use crate::imagehost::ImageUpload;
use crate::models::{new_id, ImageRecord};

impl ClinicService {
    /// Forward an image to the host and record it against a patient. Nothing
    /// is stored when the host call fails.
    pub async fn upload_image(&self, patient_id: Option<String>, image: Option<ImageUpload>) -> Result<ImageRecord> {
        let image = image.ok_or_else(|| ClinicError::Validation("No image uploaded".to_string()))?;
        if !image.content_type.starts_with("image/") {
            return Err(ClinicError::Validation(format!(
                "Unsupported file type: {}",
                image.content_type
            )));
        }
        if image.data.is_empty() {
            return Err(ClinicError::Validation("Uploaded image is empty".to_string()));
        }

        let patient_id = patient_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClinicError::Validation("Patient id is required".to_string()))?;
        if self.storage.patients.get(&patient_id)?.is_none() {
            return Err(ClinicError::Validation(format!("Unknown patient: {}", patient_id)));
        }

        let hosted = self.images.upload(image).await?;

        let public_id = hosted.public_id.clone();
        let record = ImageRecord {
            id: new_id(),
            patient_id,
            image: hosted,
        };
        let record = self.storage.images.insert(record).map_err(|e| {
            // The file stays on the host under this public id
            error!(public_id = %public_id, error = %e, "image uploaded but not recorded");
            ClinicError::from(e)
        })?;

        info!(id = %record.id, patient_id = %record.patient_id, "image attached");
        Ok(record)
    }

    pub fn list_images(&self, patient_id: Option<&str>) -> Result<Vec<ImageRecord>> {
        match patient_id {
            Some(patient_id) => Ok(self.storage.images.filter(|r| r.patient_id == patient_id)?),
            None => Ok(self.storage.images.all()?),
        }
    }

    /// Remove an image from the host, then from the store
    pub async fn delete_image(&self, id: &str) -> Result<()> {
        let record = self
            .storage
            .images
            .get(id)?
            .ok_or_else(|| ClinicError::not_found("Serial"))?;

        self.images.destroy(&record.image.public_id).await?;
        self.storage.images.remove(id)?;

        info!(id, public_id = %record.image.public_id, "image deleted");
        Ok(())
    }
}
