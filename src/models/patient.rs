use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::de::{optional_day, optional_number};
use super::{new_id, required};
use crate::error::ClinicError;
use crate::storage::Document;

/// A registered patient together with every visit on record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "patientSerial")]
    pub serial: u64,
    #[serde(rename = "patientName")]
    pub name: String,
    #[serde(rename = "patientAge")]
    pub age: u32,
    #[serde(rename = "patientMobile")]
    pub mobile: String,
    /// Admission date
    #[serde(rename = "patientDate", default, deserialize_with = "optional_day")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub history: PatientHistory,
    #[serde(rename = "medicalHistory", default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub visits: Vec<Visit>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Patient {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientHistory {
    pub present_history: Vec<String>,
    pub past_history: Vec<String>,
    pub family_history: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_day")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub duration: String,
    #[serde(alias = "symtoms", default)]
    pub symptoms: Symptoms,
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
}

/// One symptom category with the sub-symptoms picked under it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Symptoms {
    #[serde(rename = "symptomsName", alias = "symtomsName", default)]
    pub name: String,
    #[serde(rename = "subSymptoms", alias = "subSymtoms", default)]
    pub sub_symptoms: Vec<SubSymptom>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSymptom {
    #[serde(rename = "subSymptomsName", alias = "subSymtomsName")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub name: String,
    #[serde(default)]
    pub dose: String,
}

/// Body of a visit add or edit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitRequest {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "optional_day")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub duration: String,
    #[serde(alias = "symtoms", default)]
    pub symptoms: Symptoms,
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
}

impl VisitRequest {
    pub fn into_visit(self, id: String) -> Visit {
        Visit {
            id,
            date: self.date,
            problem: self.problem,
            condition: self.condition,
            duration: self.duration,
            symptoms: self.symptoms,
            prescriptions: self.prescriptions,
        }
    }
}

/// Body of a patient create or full replace
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRequest {
    #[serde(default, deserialize_with = "optional_number")]
    pub patient_serial: Option<u64>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_mobile: Option<String>,
    #[serde(default, deserialize_with = "optional_day")]
    pub patient_date: Option<NaiveDate>,
    #[serde(default)]
    pub history: Option<PatientHistory>,
    #[serde(default)]
    pub medical_history: Option<Vec<String>>,
    #[serde(default)]
    pub visits: Option<Vec<VisitRequest>>,
}

/// The fields every patient record must carry
#[derive(Debug, Clone, PartialEq)]
pub struct Demographics {
    pub name: String,
    pub age: u32,
    pub mobile: String,
}

impl PatientRequest {
    pub fn demographics(&self) -> Result<Demographics, ClinicError> {
        let name = required(self.patient_name.clone());
        let mobile = required(self.patient_mobile.clone());
        let age = self.patient_age.filter(|age| *age > 0);

        match (name, age, mobile) {
            (Some(name), Some(age), Some(mobile)) => Ok(Demographics { name, age, mobile }),
            _ => Err(ClinicError::Validation("Mandatory fields are required".to_string())),
        }
    }

    /// Visits carried in the body, keeping submitted ids that are not
    /// repeated and generating the rest
    pub fn take_visits(&mut self) -> Vec<Visit> {
        let mut visits: Vec<Visit> = Vec::new();
        for request in self.visits.take().unwrap_or_default() {
            let id = match request.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() && !visits.iter().any(|v| v.id == id) => id.to_string(),
                _ => new_id(),
            };
            visits.push(request.into_visit(id));
        }
        visits
    }
}

impl Patient {
    pub fn visit(&self, visit_id: &str) -> Option<&Visit> {
        self.visits.iter().find(|v| v.id == visit_id)
    }

    /// Remove one visit, leaving the others in order
    pub fn remove_visit(&mut self, visit_id: &str) -> Option<Visit> {
        let index = self.visits.iter().position(|v| v.id == visit_id)?;
        Some(self.visits.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_demographics_required() {
        let request: PatientRequest = serde_json::from_str(
            r#"{"patientName": " Rahim ", "patientAge": "45", "patientMobile": "01700000000"}"#,
        )
        .unwrap();
        assert_eq!(
            request.demographics().unwrap(),
            Demographics {
                name: "Rahim".to_string(),
                age: 45,
                mobile: "01700000000".to_string(),
            }
        );

        for body in [
            r#"{"patientAge": 45, "patientMobile": "017"}"#,
            r#"{"patientName": "Rahim", "patientMobile": "017"}"#,
            r#"{"patientName": "Rahim", "patientAge": 45}"#,
            r#"{"patientName": "  ", "patientAge": 45, "patientMobile": "017"}"#,
            r#"{"patientName": "Rahim", "patientAge": 0, "patientMobile": "017"}"#,
        ] {
            let request: PatientRequest = serde_json::from_str(body).unwrap();
            assert!(matches!(request.demographics(), Err(ClinicError::Validation(_))), "{}", body);
        }
    }

    #[test]
    fn test_legacy_symptom_spelling() {
        let visit: VisitRequest = serde_json::from_str(
            r#"{
                "date": "2026-02-01",
                "problem": "fever",
                "symtoms": {"symtomsName": "General", "subSymtoms": [{"subSymtomsName": "chills"}]},
                "prescriptions": [{"name": "Paracetamol", "dose": "500mg"}]
            }"#,
        )
        .unwrap();

        assert_eq!(visit.symptoms.name, "General");
        assert_eq!(visit.symptoms.sub_symptoms[0].name, "chills");

        let json = serde_json::to_value(visit.into_visit("v1".to_string())).unwrap();
        assert_eq!(json["symptoms"]["subSymptoms"][0]["subSymptomsName"], "chills");
        assert_eq!(json["date"], "2026-02-01");
    }

    #[test]
    fn test_take_visits_dedupes_ids() {
        let mut request: PatientRequest = serde_json::from_str(
            r#"{"visits": [{"_id": "a", "problem": "one"}, {"_id": "a", "problem": "two"}, {"problem": "three"}]}"#,
        )
        .unwrap();

        let visits = request.take_visits();
        assert_eq!(visits.len(), 3);
        assert_eq!(visits[0].id, "a");
        assert_ne!(visits[1].id, "a");
        assert_ne!(visits[2].id, visits[1].id);
    }
}
