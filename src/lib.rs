//! clinicdb: patient records for a small clinic
//!
//! Patients with their visit history, symptom and history taxonomies,
//! doctors, an income/expense ledger and hosted patient images, kept in an
//! embedded write-ahead-logged document store and served over a REST API.

pub mod api;
pub mod clinic;
pub mod config;
pub mod error;
pub mod imagehost;
pub mod models;
pub mod storage;
