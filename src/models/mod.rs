//! Clinic document and request types
//!
//! Wire names follow the JSON the clinic front end already speaks: camelCase
//! fields and `_id` identifiers. Misspelled legacy field names are accepted on
//! input as aliases.

pub mod accounting;
pub mod de;
pub mod doctor;
pub mod image;
pub mod patient;
pub mod taxonomy;

pub use accounting::{Transaction, TransactionRequest, TransactionType};
pub use doctor::{Doctor, DoctorProfile, DoctorRequest};
pub use image::{HostedImage, ImageRecord};
pub use patient::{
    Demographics, Patient, PatientHistory, PatientRequest, Prescription, SubSymptom, Symptoms,
    Visit, VisitRequest,
};
pub use taxonomy::{
    Category, CategoryRequest, HistoryEntry, HistoryRequest, SubCategory, SubHistory, SubItem,
    Taxonomy,
};

/// Generate a fresh document id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trim a required text field, treating blank as missing
pub(crate) fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
