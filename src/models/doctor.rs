use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::required;
use crate::error::ClinicError;
use crate::storage::Document;

/// The clinic identity shown on prescriptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    pub medical_name: String,
    pub doctor_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Document for Doctor {
    fn id(&self) -> &str {
        &self.id
    }
}

/// What the API returns for a doctor: everything except the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub medical_name: String,
    pub doctor_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Doctor> for DoctorProfile {
    fn from(doctor: &Doctor) -> Self {
        DoctorProfile {
            id: doctor.id.clone(),
            medical_name: doctor.medical_name.clone(),
            doctor_name: doctor.doctor_name.clone(),
            phone: doctor.phone.clone(),
            email: doctor.email.clone(),
            address: doctor.address.clone(),
            created_at: doctor.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorRequest {
    pub medical_name: Option<String>,
    pub doctor_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

/// A doctor request with every field present
#[derive(Debug, Clone)]
pub struct ValidDoctor {
    pub medical_name: String,
    pub doctor_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub password: String,
}

impl DoctorRequest {
    pub fn validate(self) -> Result<ValidDoctor, ClinicError> {
        // The password is not trimmed
        let password = self.password.filter(|p| !p.is_empty());
        match (
            required(self.medical_name),
            required(self.doctor_name),
            required(self.phone),
            required(self.email),
            required(self.address),
            password,
        ) {
            (Some(medical_name), Some(doctor_name), Some(phone), Some(email), Some(address), Some(password)) => {
                Ok(ValidDoctor {
                    medical_name,
                    doctor_name,
                    phone,
                    email,
                    address,
                    password,
                })
            }
            _ => Err(ClinicError::Validation("All fields are required".to_string())),
        }
    }
}
