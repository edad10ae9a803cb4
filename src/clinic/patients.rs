use chrono::Utc;
use tracing::info;

use super::ClinicService;
use crate::error::{ClinicError, Result};
use crate::models::{new_id, Patient, PatientRequest, VisitRequest};

/// First serial handed out by an empty clinic
pub const SERIAL_SEED: u64 = 20_260_001;

/// One more than the highest serial in use, or the seed. Fails once the
/// highest serial is `u64::MAX`.
pub fn next_serial(patients: &[Patient]) -> Result<u64> {
    match patients.iter().map(|p| p.serial).max() {
        None => Ok(SERIAL_SEED),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| ClinicError::Conflict("No patient serial left to assign".to_string())),
    }
}

fn duplicate_serial(serial: u64) -> ClinicError {
    ClinicError::Conflict(format!("Patient serial {} is already in use", serial))
}

impl ClinicService {
    /// All patients, latest serial first
    pub fn list_patients(&self) -> Result<Vec<Patient>> {
        let mut patients = self.storage.patients.all()?;
        patients.sort_by(|a, b| b.serial.cmp(&a.serial));
        Ok(patients)
    }

    pub fn get_patient(&self, id: &str) -> Result<Patient> {
        self.storage
            .patients
            .get(id)?
            .ok_or_else(|| ClinicError::not_found("Patient"))
    }

    pub fn next_patient_serial(&self) -> Result<u64> {
        self.storage.patients.view(next_serial)?
    }

    /// Register a patient. An omitted serial is assigned here, under the
    /// same lock as the insert.
    pub fn create_patient(&self, mut request: PatientRequest) -> Result<Patient> {
        let demographics = request.demographics()?;
        let visits = request.take_visits();
        let now = Utc::now();

        let patient = self.storage.patients.insert_with(|patients| {
            let serial = match request.patient_serial {
                Some(serial) if patients.iter().any(|p| p.serial == serial) => {
                    return Err(duplicate_serial(serial))
                }
                Some(serial) => serial,
                None => next_serial(patients)?,
            };

            Ok(Patient {
                id: new_id(),
                serial,
                name: demographics.name,
                age: demographics.age,
                mobile: demographics.mobile,
                date: request.patient_date,
                history: request.history.unwrap_or_default(),
                medical_history: request.medical_history.unwrap_or_default(),
                visits,
                created_at: now,
                updated_at: now,
            })
        })?;

        info!(id = %patient.id, serial = patient.serial, "patient created");
        Ok(patient)
    }

    /// Replace a patient document. The id, creation time and, when the body
    /// carries none, the serial are kept.
    pub fn update_patient(&self, id: &str, mut request: PatientRequest) -> Result<Patient> {
        let demographics = request.demographics()?;
        let visits = request.take_visits();
        let PatientRequest {
            patient_serial,
            patient_date,
            history,
            medical_history,
            ..
        } = request;

        let patient = self
            .storage
            .patients
            .update_with(id, |patient, patients| {
                if let Some(serial) = patient_serial {
                    if patients.iter().any(|p| p.id != patient.id && p.serial == serial) {
                        return Err(duplicate_serial(serial));
                    }
                    patient.serial = serial;
                }
                patient.name = demographics.name;
                patient.age = demographics.age;
                patient.mobile = demographics.mobile;
                patient.date = patient_date;
                patient.history = history.unwrap_or_default();
                patient.medical_history = medical_history.unwrap_or_default();
                patient.visits = visits;
                patient.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| ClinicError::not_found("Patient"))?;

        info!(id, "patient updated");
        Ok(patient)
    }

    pub fn add_visit(&self, patient_id: &str, request: VisitRequest) -> Result<Patient> {
        let visit = request.into_visit(new_id());
        let visit_id = visit.id.clone();

        let patient = self
            .storage
            .patients
            .update(patient_id, |patient| {
                patient.visits.push(visit);
                patient.updated_at = Utc::now();
                Ok::<_, ClinicError>(())
            })?
            .ok_or_else(|| ClinicError::not_found("Patient"))?;

        info!(patient_id, visit_id = %visit_id, "visit added");
        Ok(patient)
    }

    /// Overwrite one visit in place; its id and position are kept
    pub fn update_visit(&self, patient_id: &str, visit_id: &str, request: VisitRequest) -> Result<Patient> {
        let patient = self
            .storage
            .patients
            .update(patient_id, |patient| {
                let visit = patient
                    .visits
                    .iter_mut()
                    .find(|v| v.id == visit_id)
                    .ok_or_else(|| ClinicError::not_found("Visit"))?;
                *visit = request.into_visit(visit_id.to_string());
                patient.updated_at = Utc::now();
                Ok::<_, ClinicError>(())
            })?
            .ok_or_else(|| ClinicError::not_found("Patient"))?;

        info!(patient_id, visit_id, "visit updated");
        Ok(patient)
    }

    pub fn delete_visit(&self, patient_id: &str, visit_id: &str) -> Result<Patient> {
        let patient = self
            .storage
            .patients
            .update(patient_id, |patient| {
                patient
                    .remove_visit(visit_id)
                    .ok_or_else(|| ClinicError::not_found("Visit"))?;
                patient.updated_at = Utc::now();
                Ok::<_, ClinicError>(())
            })?
            .ok_or_else(|| ClinicError::not_found("Patient"))?;

        info!(patient_id, visit_id, "visit deleted");
        Ok(patient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic::testing::service;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(value: serde_json::Value) -> PatientRequest {
        serde_json::from_value(value).unwrap()
    }

    fn visit(value: serde_json::Value) -> VisitRequest {
        serde_json::from_value(value).unwrap()
    }

    fn register(clinic: &ClinicService, name: &str) -> Patient {
        clinic
            .create_patient(request(json!({
                "patientName": name,
                "patientAge": 30,
                "patientMobile": "01711111111",
            })))
            .unwrap()
    }

    fn register_with_serial(clinic: &ClinicService, name: &str, serial: u64) -> Patient {
        clinic
            .create_patient(request(json!({
                "patientSerial": serial,
                "patientName": name,
                "patientAge": 30,
                "patientMobile": "01711111111",
            })))
            .unwrap()
    }

    #[test]
    fn test_missing_mandatory_fields_persist_nothing() {
        let clinic = service();
        let result = clinic.create_patient(request(json!({"patientName": "Karim", "patientAge": 40})));

        assert!(matches!(result, Err(ClinicError::Validation(_))));
        assert!(clinic.list_patients().unwrap().is_empty());
    }

    #[test]
    fn test_serials_start_at_seed_and_increase() {
        let clinic = service();
        assert_eq!(clinic.next_patient_serial().unwrap(), SERIAL_SEED);

        let first = register(&clinic, "A");
        let second = register(&clinic, "B");
        assert_eq!(first.serial, SERIAL_SEED);
        assert_eq!(second.serial, SERIAL_SEED + 1);
        assert_eq!(clinic.next_patient_serial().unwrap(), SERIAL_SEED + 2);
    }

    #[test]
    fn test_next_serial_follows_maximum() {
        let clinic = service();
        clinic
            .create_patient(request(json!({
                "patientSerial": 500,
                "patientName": "A",
                "patientAge": 30,
                "patientMobile": "017",
            })))
            .unwrap();
        register(&clinic, "B");

        assert_eq!(clinic.next_patient_serial().unwrap(), 502);
        let serials: Vec<u64> = clinic.list_patients().unwrap().iter().map(|p| p.serial).collect();
        assert_eq!(serials, vec![501, 500]);
    }

    #[test]
    fn test_exhausted_serials_conflict_without_poisoning() {
        let clinic = service();
        clinic
            .create_patient(request(json!({
                "patientSerial": u64::MAX,
                "patientName": "A",
                "patientAge": 30,
                "patientMobile": "017",
            })))
            .unwrap();

        assert!(matches!(clinic.next_patient_serial(), Err(ClinicError::Conflict(_))));
        let result = clinic.create_patient(request(json!({
            "patientName": "B",
            "patientAge": 30,
            "patientMobile": "017",
        })));
        assert!(matches!(result, Err(ClinicError::Conflict(_))));

        // The collection stays usable
        assert_eq!(clinic.list_patients().unwrap().len(), 1);
        let patient = register_with_serial(&clinic, "C", 7);
        assert_eq!(patient.serial, 7);
    }

    #[test]
    fn test_concurrent_creates_get_distinct_serials() {
        let clinic = service();
        let patients: Vec<Patient> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let clinic = &clinic;
                    scope.spawn(move || register(clinic, &format!("P{}", i)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut serials: Vec<u64> = patients.iter().map(|p| p.serial).collect();
        serials.sort_unstable();
        let expected: Vec<u64> = (SERIAL_SEED..SERIAL_SEED + 16).collect();
        assert_eq!(serials, expected);
        assert_eq!(clinic.list_patients().unwrap().len(), 16);
    }

    #[test]
    fn test_duplicate_serial_conflicts() {
        let clinic = service();
        let first = register(&clinic, "A");

        let result = clinic.create_patient(request(json!({
            "patientSerial": first.serial,
            "patientName": "B",
            "patientAge": 30,
            "patientMobile": "017",
        })));
        assert!(matches!(result, Err(ClinicError::Conflict(_))));
    }

    #[test]
    fn test_add_visit_appends_exactly_one() {
        let clinic = service();
        let patient = register(&clinic, "A");

        let updated = clinic
            .add_visit(
                &patient.id,
                visit(json!({
                    "date": "2026-05-01",
                    "problem": "cough",
                    "condition": "mild",
                    "duration": "3 days",
                    "symptoms": {"symptomsName": "Respiratory", "subSymptoms": [{"subSymptomsName": "dry cough"}]},
                    "prescriptions": [{"name": "Syrup", "dose": "2 tsp"}],
                })),
            )
            .unwrap();

        assert_eq!(updated.visits.len(), patient.visits.len() + 1);
        let added = updated.visits.last().unwrap();
        assert_eq!(added.problem, "cough");
        assert_eq!(added.condition, "mild");
        assert_eq!(added.duration, "3 days");
        assert_eq!(added.symptoms.name, "Respiratory");
        assert_eq!(added.prescriptions[0].dose, "2 tsp");
        assert_eq!(clinic.get_patient(&patient.id).unwrap(), updated);
    }

    #[test]
    fn test_add_visit_unknown_patient() {
        let clinic = service();
        let result = clinic.add_visit("missing", VisitRequest::default());
        assert!(matches!(result, Err(ClinicError::NotFound(m)) if m == "Patient not found"));
    }

    #[test]
    fn test_delete_visit_removes_only_that_visit() {
        let clinic = service();
        let patient = register(&clinic, "A");
        for problem in ["one", "two", "three"] {
            clinic.add_visit(&patient.id, visit(json!({"problem": problem}))).unwrap();
        }
        let before = clinic.get_patient(&patient.id).unwrap();
        let target = before.visits[1].id.clone();

        let after = clinic.delete_visit(&patient.id, &target).unwrap();

        let problems: Vec<&str> = after.visits.iter().map(|v| v.problem.as_str()).collect();
        assert_eq!(problems, vec!["one", "three"]);
        assert_eq!(after.visits[0], before.visits[0]);
        assert_eq!(after.visits[1], before.visits[2]);
    }

    #[test]
    fn test_delete_unknown_visit_leaves_patient() {
        let clinic = service();
        let patient = register(&clinic, "A");
        let before = clinic.add_visit(&patient.id, visit(json!({"problem": "one"}))).unwrap();

        let result = clinic.delete_visit(&patient.id, "no-such-visit");

        assert!(matches!(result, Err(ClinicError::NotFound(m)) if m == "Visit not found"));
        assert_eq!(clinic.get_patient(&patient.id).unwrap(), before);
    }

    #[test]
    fn test_update_visit_in_place() {
        let clinic = service();
        let patient = register(&clinic, "A");
        clinic.add_visit(&patient.id, visit(json!({"problem": "one"}))).unwrap();
        let with_two = clinic.add_visit(&patient.id, visit(json!({"problem": "two"}))).unwrap();
        let first_id = with_two.visits[0].id.clone();

        let updated = clinic
            .update_visit(
                &patient.id,
                &first_id,
                visit(json!({"problem": "one, revised", "prescriptions": [{"name": "Zinc", "dose": "10mg"}]})),
            )
            .unwrap();

        assert_eq!(updated.visits[0].id, first_id);
        assert_eq!(updated.visits[0].problem, "one, revised");
        assert_eq!(updated.visits[0].prescriptions.len(), 1);
        assert_eq!(updated.visits[1], with_two.visits[1]);
    }

    #[test]
    fn test_update_patient_replaces_document() {
        let clinic = service();
        let patient = register(&clinic, "A");
        clinic.add_visit(&patient.id, visit(json!({"problem": "one"}))).unwrap();

        let updated = clinic
            .update_patient(
                &patient.id,
                request(json!({
                    "patientName": "A. Rahman",
                    "patientAge": "31",
                    "patientMobile": "01722222222",
                    "medicalHistory": ["asthma"],
                    "history": {"presentHistory": ["fever"]},
                })),
            )
            .unwrap();

        assert_eq!(updated.id, patient.id);
        assert_eq!(updated.serial, patient.serial);
        assert_eq!(updated.created_at, patient.created_at);
        assert_eq!(updated.name, "A. Rahman");
        assert_eq!(updated.age, 31);
        assert_eq!(updated.medical_history, vec!["asthma".to_string()]);
        assert_eq!(updated.history.present_history, vec!["fever".to_string()]);
        assert!(updated.visits.is_empty());
    }

    #[test]
    fn test_update_patient_serial_must_stay_unique() {
        let clinic = service();
        let first = register(&clinic, "A");
        let second = register(&clinic, "B");

        let result = clinic.update_patient(
            &second.id,
            request(json!({
                "patientSerial": first.serial,
                "patientName": "B",
                "patientAge": 30,
                "patientMobile": "017",
            })),
        );
        assert!(matches!(result, Err(ClinicError::Conflict(_))));
        assert_eq!(clinic.get_patient(&second.id).unwrap(), second);
    }
}
