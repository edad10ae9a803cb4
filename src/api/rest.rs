use std::convert::Infallible;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};
use warp::filters::body::BodyDeserializeError;
use warp::filters::multipart::{FormData, Part};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::clinic::{ClinicService, LedgerQuery};
use crate::error::ClinicError;
use crate::imagehost::ImageUpload;
use crate::models::{
    Category, DoctorRequest, HistoryEntry, PatientRequest, Taxonomy, TransactionRequest,
    VisitRequest,
};

/// Largest JSON body accepted outside the upload route
const JSON_BODY_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        ApiResponse {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemRequest {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct SerialQuery {
    #[serde(rename = "pId", default)]
    patient_id: Option<String>,
}

fn respond<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_response(err: ClinicError) -> Response {
    if err.is_unexpected() {
        error!(error = %err, "request failed");
    } else {
        debug!(error = %err, "request rejected");
    }
    respond(err.status_code(), &ApiResponse::error(err.to_string()))
}

fn reply_with<T: Serialize>(status: StatusCode, result: Result<T, ClinicError>) -> Response {
    match result {
        Ok(body) => respond(status, &body),
        Err(err) => error_response(err),
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Option<serde_json::Value>, ClinicError> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| ClinicError::Storage(e.into()))
}

#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// JSON body capped at `JSON_BODY_LIMIT` when the client declares a length.
/// Chunked bodies without a `Content-Length` are accepted.
fn json_body<T: serde::de::DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(|length: Option<u64>| async move {
            match length {
                Some(length) if length > JSON_BODY_LIMIT => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::json())
}

pub struct RestApi {
    clinic: Arc<ClinicService>,
    max_upload_bytes: u64,
}

impl RestApi {
    pub fn new(clinic: Arc<ClinicService>, max_upload_bytes: u64) -> Self {
        RestApi {
            clinic,
            max_upload_bytes,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allow_headers(vec!["content-type", "authorization"]);

        self.health()
            .or(self.patient_routes())
            .unify()
            .or(self.taxonomy_routes::<Category>("categories"))
            .unify()
            .or(self.taxonomy_routes::<HistoryEntry>("history"))
            .unify()
            .or(self.doctor_routes())
            .unify()
            .or(self.accounting_routes())
            .unify()
            .or(self.serial_routes())
            .unify()
            .recover(handle_rejection)
            .with(cors)
            .with(warp::trace::request())
    }

    fn with_clinic(&self) -> impl Filter<Extract = (Arc<ClinicService>,), Error = Infallible> + Clone {
        let clinic = Arc::clone(&self.clinic);
        warp::any().map(move || Arc::clone(&clinic))
    }

    fn health(&self) -> BoxedFilter<(Response,)> {
        warp::path::end()
            .and(warp::get())
            .map(|| {
                respond(
                    StatusCode::OK,
                    &json!({
                        "status": "success",
                        "message": "API is running...",
                        "timestamp": Utc::now().to_rfc3339(),
                    }),
                )
            })
            .boxed()
    }

    fn patient_routes(&self) -> BoxedFilter<(Response,)> {
        let list = warp::path!("api" / "patients")
            .and(warp::get())
            .and(self.with_clinic())
            .map(|clinic: Arc<ClinicService>| reply_with(StatusCode::OK, clinic.list_patients()));

        // Matched before the `:id` route so "id" is not taken for a patient id
        let next_id = warp::path!("api" / "patients" / "id")
            .and(warp::get())
            .and(self.with_clinic())
            .map(|clinic: Arc<ClinicService>| {
                reply_with(
                    StatusCode::OK,
                    clinic.next_patient_serial().map(|next| json!({ "nextId": next })),
                )
            });

        let get = warp::path!("api" / "patients" / String)
            .and(warp::get())
            .and(self.with_clinic())
            .map(|id: String, clinic: Arc<ClinicService>| reply_with(StatusCode::OK, clinic.get_patient(&id)));

        let create = warp::path!("api" / "patients")
            .and(warp::post())
            .and(self.with_clinic())
            .and(json_body())
            .map(|clinic: Arc<ClinicService>, request: PatientRequest| {
                reply_with(StatusCode::CREATED, clinic.create_patient(request))
            });

        let update = warp::path!("api" / "patients" / String)
            .and(warp::put())
            .and(self.with_clinic())
            .and(json_body())
            .map(|id: String, clinic: Arc<ClinicService>, request: PatientRequest| {
                reply_with(StatusCode::OK, clinic.update_patient(&id, request))
            });

        let add_visit = warp::path!("api" / "patients" / String / "visits")
            .and(warp::post())
            .and(self.with_clinic())
            .and(json_body())
            .map(|id: String, clinic: Arc<ClinicService>, request: VisitRequest| {
                reply_with(StatusCode::CREATED, clinic.add_visit(&id, request))
            });

        let update_visit = warp::path!("api" / "patients" / String / "visits" / String)
            .and(warp::put())
            .and(self.with_clinic())
            .and(json_body())
            .map(
                |id: String, visit_id: String, clinic: Arc<ClinicService>, request: VisitRequest| {
                    reply_with(StatusCode::OK, clinic.update_visit(&id, &visit_id, request))
                },
            );

        let delete_visit = warp::path!("api" / "patients" / String / "visits" / String)
            .and(warp::delete())
            .and(self.with_clinic())
            .map(|id: String, visit_id: String, clinic: Arc<ClinicService>| {
                reply_with(StatusCode::OK, clinic.delete_visit(&id, &visit_id))
            });

        list.or(next_id)
            .unify()
            .or(get)
            .unify()
            .or(create)
            .unify()
            .or(update)
            .unify()
            .or(add_visit)
            .unify()
            .or(update_visit)
            .unify()
            .or(delete_visit)
            .unify()
            .boxed()
    }

    /// Routes shared by the category and history resources under `/api/<prefix>`
    fn taxonomy_routes<T: Taxonomy>(&self, prefix: &'static str) -> BoxedFilter<(Response,)> {
        let root = warp::path("api").and(warp::path(prefix));

        let list = root
            .clone()
            .and(warp::path::end())
            .and(warp::get())
            .and(self.with_clinic())
            .map(|clinic: Arc<ClinicService>| reply_with(StatusCode::OK, clinic.list_taxonomy::<T>()));

        let create = root
            .clone()
            .and(warp::path::end())
            .and(warp::post())
            .and(self.with_clinic())
            .and(json_body())
            .map(|clinic: Arc<ClinicService>, request: T::Request| {
                match clinic.find_or_create_taxonomy::<T>(request) {
                    Ok((entry, true)) => respond(StatusCode::CREATED, &entry),
                    Ok((entry, false)) => respond(StatusCode::OK, &entry),
                    Err(err) => error_response(err),
                }
            });

        let replace = root
            .clone()
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::put())
            .and(self.with_clinic())
            .and(json_body())
            .map(|id: String, clinic: Arc<ClinicService>, request: T::Request| {
                reply_with(StatusCode::OK, clinic.replace_taxonomy_items::<T>(&id, request))
            });

        let add_item = root
            .and(warp::path::param::<String>())
            .and(warp::path("items"))
            .and(warp::path::end())
            .and(warp::post())
            .and(self.with_clinic())
            .and(json_body())
            .map(|id: String, clinic: Arc<ClinicService>, request: ItemRequest| {
                reply_with(StatusCode::OK, clinic.add_taxonomy_item::<T>(&id, &request.name))
            });

        list.or(create)
            .unify()
            .or(replace)
            .unify()
            .or(add_item)
            .unify()
            .boxed()
    }

    fn doctor_routes(&self) -> BoxedFilter<(Response,)> {
        let list = warp::path!("api" / "doctors")
            .and(warp::get())
            .and(self.with_clinic())
            .map(|clinic: Arc<ClinicService>| reply_with(StatusCode::OK, clinic.list_doctors()));

        let create = warp::path!("api" / "doctors")
            .and(warp::post())
            .and(self.with_clinic())
            .and(json_body())
            .and_then(|clinic: Arc<ClinicService>, request: DoctorRequest| async move {
                let result = clinic.create_doctor(request).await.map(|doctor| {
                    json!({ "message": "Doctor created successfully", "doctor": doctor })
                });
                Ok::<_, Infallible>(reply_with(StatusCode::CREATED, result))
            });

        list.or(create).unify().boxed()
    }

    fn accounting_routes(&self) -> BoxedFilter<(Response,)> {
        let list = warp::path!("api" / "accounting")
            .and(warp::get())
            .and(self.with_clinic())
            .and(warp::query::<LedgerQuery>())
            .map(|clinic: Arc<ClinicService>, query: LedgerQuery| {
                let result = query.to_filter().and_then(|filter| clinic.list_transactions(filter));
                reply_with(StatusCode::OK, result)
            });

        let summary = warp::path!("api" / "accounting" / "summary")
            .and(warp::get())
            .and(self.with_clinic())
            .and(warp::query::<LedgerQuery>())
            .map(|clinic: Arc<ClinicService>, query: LedgerQuery| {
                let result = query.to_filter().and_then(|filter| clinic.ledger_summary(filter));
                reply_with(StatusCode::OK, result)
            });

        let create = warp::path!("api" / "accounting")
            .and(warp::post())
            .and(self.with_clinic())
            .and(json_body())
            .map(|clinic: Arc<ClinicService>, request: TransactionRequest| {
                reply_with(StatusCode::CREATED, clinic.create_transaction(request))
            });

        let delete = warp::path!("api" / "accounting" / String)
            .and(warp::delete())
            .and(self.with_clinic())
            .map(|id: String, clinic: Arc<ClinicService>| {
                let result = clinic
                    .delete_transaction(&id)
                    .map(|_| json!({ "message": "Transaction deleted successfully" }));
                reply_with(StatusCode::OK, result)
            });

        list.or(summary)
            .unify()
            .or(create)
            .unify()
            .or(delete)
            .unify()
            .boxed()
    }

    fn serial_routes(&self) -> BoxedFilter<(Response,)> {
        let upload = warp::path!("api" / "serial")
            .and(warp::post())
            .and(self.with_clinic())
            .and(warp::multipart::form().max_length(self.max_upload_bytes))
            .and_then(|clinic: Arc<ClinicService>, form: FormData| async move {
                let result = match read_upload(form).await {
                    Ok((patient_id, image)) => clinic.upload_image(patient_id, image).await,
                    Err(err) => Err(err),
                };
                let result = result
                    .and_then(|record| to_data(&record))
                    .map(|data| ApiResponse::success("Image uploaded", data));
                Ok::<_, Infallible>(reply_with(StatusCode::CREATED, result))
            });

        let list = warp::path!("api" / "serial")
            .and(warp::get())
            .and(self.with_clinic())
            .and(warp::query::<SerialQuery>())
            .map(|clinic: Arc<ClinicService>, query: SerialQuery| {
                let patient_id = query.patient_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
                let result = clinic
                    .list_images(patient_id)
                    .and_then(|records| to_data(&records))
                    .map(|data| ApiResponse::success("Images found", data));
                reply_with(StatusCode::OK, result)
            });

        let delete = warp::path!("api" / "serial" / String)
            .and(warp::delete())
            .and(self.with_clinic())
            .and_then(|id: String, clinic: Arc<ClinicService>| async move {
                let result = clinic
                    .delete_image(&id)
                    .await
                    .map(|_| ApiResponse::success("Serial deleted successfully", None));
                Ok::<_, Infallible>(reply_with(StatusCode::OK, result))
            });

        upload.or(list).unify().or(delete).unify().boxed()
    }
}

fn invalid_upload(err: warp::Error) -> ClinicError {
    ClinicError::Validation(format!("Invalid upload: {}", err))
}

async fn read_part(mut part: Part) -> Result<Bytes, ClinicError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = part.data().await {
        let chunk = chunk.map_err(invalid_upload)?;
        data.extend_from_slice(chunk.chunk());
    }
    Ok(data.freeze())
}

/// Pull the `photo` file and the `pId` field out of an upload form. Other
/// parts are skipped.
async fn read_upload(mut form: FormData) -> Result<(Option<String>, Option<ImageUpload>), ClinicError> {
    let mut patient_id = None;
    let mut image = None;

    while let Some(part) = form.try_next().await.map_err(invalid_upload)? {
        let name = part.name().to_string();
        match name.as_str() {
            "photo" => {
                let file_name = part.filename().unwrap_or("upload").to_string();
                let content_type = part
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = read_part(part).await?;
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            "pId" => {
                let data = read_part(part).await?;
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| ClinicError::Validation("Patient id must be text".to_string()))?;
                patient_id = Some(value);
            }
            other => debug!(part = other, "ignoring upload part"),
        }
    }

    Ok((patient_id, image))
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found".to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() || err.find::<BodyTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        (StatusCode::LENGTH_REQUIRED, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(respond(status, &ApiResponse::error(message)))
}
