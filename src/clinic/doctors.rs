use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::Utc;
use tracing::info;

use super::ClinicService;
use crate::error::{ClinicError, Result};
use crate::models::{new_id, Doctor, DoctorProfile, DoctorRequest};

/// Hashes a password using Argon2 with a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ClinicError::PasswordHash(e.to_string()))
}

impl ClinicService {
    pub async fn create_doctor(&self, request: DoctorRequest) -> Result<DoctorProfile> {
        let valid = request.validate()?;

        // Argon2 is CPU-bound, so it runs on the blocking pool
        let password = valid.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ClinicError::PasswordHash(e.to_string()))??;

        let doctor = self.storage.doctors.insert(Doctor {
            id: new_id(),
            medical_name: valid.medical_name,
            doctor_name: valid.doctor_name,
            phone: valid.phone,
            email: valid.email,
            address: valid.address,
            password_hash,
            created_at: Utc::now(),
        })?;

        info!(id = %doctor.id, doctor = %doctor.doctor_name, "doctor created");
        Ok(DoctorProfile::from(&doctor))
    }

    pub fn list_doctors(&self) -> Result<Vec<DoctorProfile>> {
        Ok(self
            .storage
            .doctors
            .view(|doctors| doctors.iter().map(DoctorProfile::from).collect())?)
    }
}
