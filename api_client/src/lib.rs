//! API client module for the cloud face detection and identification service.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://westus.api.cognitive.microsoft.com/face/v1.0";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const GROUP_NOT_FOUND: &str = "PersonGroupNotFound";

/// Bounding box of a face in pixels, as reported by detection.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaceRectangle {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for FaceRectangle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.width, self.height)
    }
}

impl FromStr for FaceRectangle {
    type Err = String;

    /// Parses `left,top,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid rectangle {:?}: {}", s, e))?;
        match parts.as_slice() {
            [left, top, width, height] => Ok(FaceRectangle {
                left: *left,
                top: *top,
                width: *width,
                height: *height,
            }),
            _ => Err(format!("expected left,top,width,height, got {:?}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct FaceAttributes {
    #[serde(default)]
    pub smile: f64,
}

/// A face found by `detect`. The id is only valid for a short time on the
/// service side, so a detected face never outlives one polling cycle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    pub face_id: String,
    #[serde(default)]
    pub face_rectangle: FaceRectangle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_attributes: Option<FaceAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_as: Option<String>,
}

impl DetectedFace {
    pub fn smile(&self) -> Option<f64> {
        self.face_attributes.map(|a| a.smile)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub person_id: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResult {
    pub face_id: String,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// An identity known to the service.
///
/// `smiling` is local-only: it is never sent to or read from the service and
/// only holds a value while the person is identified in the current frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub persisted_face_ids: Vec<String>,
    #[serde(skip)]
    pub smiling: Option<f64>,
}

impl Person {
    pub fn new(person_id: impl Into<String>, name: impl Into<String>) -> Self {
        Person {
            person_id: person_id.into(),
            name: name.into(),
            user_data: None,
            persisted_face_ids: Vec::new(),
            smiling: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersonGroup {
    #[serde(default)]
    pub person_group_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_data: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFace {
    #[serde(default)]
    pub persisted_face_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    #[serde(default)]
    pub status: String,
    pub created_date_time: Option<String>,
    pub last_action_date_time: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CreatedPerson {
    #[serde(default)]
    person_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyRequest<'a> {
    person_group_id: &'a str,
    face_ids: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePersonRequest<'a> {
    name: &'a str,
    user_data: Option<&'a str>,
}

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("Request Error: {0}")]
    RequestError(String),
    #[error("Face API Error: {code}: {message}")]
    ServiceError { code: String, message: String },
    #[error("Decode Error: {0}")]
    DecodeError(String),
}

impl ApiClientError {
    /// Error code reported by the service, if this is a service-level error.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiClientError::ServiceError { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_group_not_found(&self) -> bool {
        self.code() == Some(GROUP_NOT_FOUND)
    }
}

/// Operations the watcher needs from the remote recognition service.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Replace the subscription key used for subsequent requests.
    fn set_key(&self, key: &str);

    async fn detect_faces(&self, image: Vec<u8>) -> Result<Vec<DetectedFace>, ApiClientError>;

    async fn identify_faces(
        &self,
        group_id: &str,
        face_ids: &[String],
    ) -> Result<Vec<IdentifyResult>, ApiClientError>;

    async fn get_group(&self, group_id: &str) -> Result<PersonGroup, ApiClientError>;

    async fn create_group(&self, group_id: &str) -> Result<PersonGroup, ApiClientError>;

    async fn train_group(&self, group_id: &str) -> Result<(), ApiClientError>;

    async fn training_status(&self, group_id: &str) -> Result<TrainingStatus, ApiClientError>;

    async fn list_persons(&self, group_id: &str) -> Result<Vec<Person>, ApiClientError>;

    async fn create_person(
        &self,
        group_id: &str,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<Person, ApiClientError>;

    async fn delete_person(&self, group_id: &str, person_id: &str) -> Result<(), ApiClientError>;

    async fn add_person_face(
        &self,
        group_id: &str,
        person_id: &str,
        image: Vec<u8>,
        rectangle: Option<FaceRectangle>,
    ) -> Result<PersistedFace, ApiClientError>;
}

pub struct FaceApiClient {
    client: reqwest::Client,
    key: RwLock<String>,
    base_url: String,
}

impl FaceApiClient {
    pub fn new(key: String) -> Self {
        Self::with_base_url(key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a new client with a custom API base URL, e.g. another region or a test server.
    pub fn with_base_url(key: String, base_url: String) -> Self {
        FaceApiClient {
            client: reqwest::Client::new(),
            key: RwLock::new(key),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn key(&self) -> String {
        match self.key.read() {
            Ok(key) => key.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn execute<T>(&self, builder: RequestBuilder) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned + Default,
    {
        let response = builder
            .header(SUBSCRIPTION_KEY_HEADER, self.key())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Face API request failed");
                ApiClientError::RequestError(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        decode_body(status, &body)
    }
}

fn status_error(status: StatusCode, body: &str) -> ApiClientError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        body.to_string()
    };
    ApiClientError::ServiceError {
        code: status.as_u16().to_string(),
        message,
    }
}

/// Turn a response body into `T`.
///
/// Some endpoints answer with an empty body; that decodes as `T::default()`.
/// A body carrying an `error` object is a service-level error whatever the
/// HTTP status says.
fn decode_body<T>(status: StatusCode, body: &str) -> Result<T, ApiClientError>
where
    T: DeserializeOwned + Default,
{
    if body.trim().is_empty() {
        if status.is_success() {
            return Ok(T::default());
        }
        return Err(status_error(status, body));
    }

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => return Err(ApiClientError::DecodeError(e.to_string())),
        Err(_) => return Err(status_error(status, body)),
    };

    if let Some(error) = value.get("error") {
        let detail = serde_json::from_value::<ServiceErrorDetail>(error.clone()).unwrap_or(
            ServiceErrorDetail {
                code: "Unknown".to_string(),
                message: error.to_string(),
            },
        );
        tracing::warn!(code = %detail.code, message = %detail.message, "Face API returned an error");
        return Err(ApiClientError::ServiceError {
            code: detail.code,
            message: detail.message,
        });
    }

    if !status.is_success() {
        return Err(status_error(status, body));
    }

    serde_json::from_value(value).map_err(|e| ApiClientError::DecodeError(e.to_string()))
}

#[async_trait]
impl RecognitionService for FaceApiClient {
    fn set_key(&self, key: &str) {
        match self.key.write() {
            Ok(mut k) => *k = key.to_string(),
            Err(poisoned) => *poisoned.into_inner() = key.to_string(),
        }
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, image)))]
    async fn detect_faces(&self, image: Vec<u8>) -> Result<Vec<DetectedFace>, ApiClientError> {
        let url = self.url("detect?returnFaceId=true&returnFaceAttributes=smile");
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);
        self.execute(request).await
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    async fn identify_faces(
        &self,
        group_id: &str,
        face_ids: &[String],
    ) -> Result<Vec<IdentifyResult>, ApiClientError> {
        let body = IdentifyRequest {
            person_group_id: group_id,
            face_ids,
        };
        let request = self.client.post(self.url("identify")).json(&body);
        self.execute(request).await
    }

    async fn get_group(&self, group_id: &str) -> Result<PersonGroup, ApiClientError> {
        let request = self.client.get(self.url(&format!("persongroups/{}", group_id)));
        self.execute(request).await
    }

    /// Creates the group with a name identical to its id.
    async fn create_group(&self, group_id: &str) -> Result<PersonGroup, ApiClientError> {
        let request = self
            .client
            .put(self.url(&format!("persongroups/{}", group_id)))
            .json(&serde_json::json!({ "name": group_id }));
        self.execute::<serde_json::Value>(request).await?;
        Ok(PersonGroup {
            person_group_id: group_id.to_string(),
            name: group_id.to_string(),
            user_data: None,
        })
    }

    async fn train_group(&self, group_id: &str) -> Result<(), ApiClientError> {
        let request = self
            .client
            .post(self.url(&format!("persongroups/{}/train", group_id)));
        self.execute::<serde_json::Value>(request).await.map(|_| ())
    }

    async fn training_status(&self, group_id: &str) -> Result<TrainingStatus, ApiClientError> {
        let request = self
            .client
            .get(self.url(&format!("persongroups/{}/training", group_id)));
        self.execute(request).await
    }

    async fn list_persons(&self, group_id: &str) -> Result<Vec<Person>, ApiClientError> {
        let request = self
            .client
            .get(self.url(&format!("persongroups/{}/persons", group_id)));
        self.execute(request).await
    }

    async fn create_person(
        &self,
        group_id: &str,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<Person, ApiClientError> {
        let request = self
            .client
            .post(self.url(&format!("persongroups/{}/persons", group_id)))
            .json(&CreatePersonRequest { name, user_data });
        let created: CreatedPerson = self.execute(request).await?;
        if created.person_id.is_empty() {
            return Err(ApiClientError::DecodeError("No personId returned".into()));
        }
        Ok(Person {
            person_id: created.person_id,
            name: name.to_string(),
            user_data: user_data.map(str::to_string),
            persisted_face_ids: Vec::new(),
            smiling: None,
        })
    }

    async fn delete_person(&self, group_id: &str, person_id: &str) -> Result<(), ApiClientError> {
        let request = self.client.delete(self.url(&format!(
            "persongroups/{}/persons/{}",
            group_id, person_id
        )));
        self.execute::<serde_json::Value>(request).await.map(|_| ())
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, image)))]
    async fn add_person_face(
        &self,
        group_id: &str,
        person_id: &str,
        image: Vec<u8>,
        rectangle: Option<FaceRectangle>,
    ) -> Result<PersistedFace, ApiClientError> {
        let mut url = self.url(&format!(
            "persongroups/{}/persons/{}/persistedFaces",
            group_id, person_id
        ));
        if let Some(rect) = rectangle {
            url.push_str(&format!("?targetFace={}", rect));
        }
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detect_response() {
        let json = r#"[
            {
                "faceId": "f1",
                "faceRectangle": {"top": 10, "left": 20, "width": 100, "height": 120},
                "faceAttributes": {"smile": 0.95}
            }
        ]"#;

        let faces: Vec<DetectedFace> = decode_body(StatusCode::OK, json).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face_id, "f1");
        assert_eq!(faces[0].face_rectangle.left, 20);
        assert_eq!(faces[0].smile(), Some(0.95));
        assert!(faces[0].identified_as.is_none());
    }

    #[test]
    fn test_empty_body_is_empty_result() {
        let faces: Vec<DetectedFace> = decode_body(StatusCode::OK, "").unwrap();
        assert!(faces.is_empty());
        let ack: serde_json::Value = decode_body(StatusCode::ACCEPTED, "  ").unwrap();
        assert!(ack.is_null());
    }

    #[test]
    fn test_error_body_is_service_error() {
        let json = r#"{"error": {"code": "PersonGroupNotFound", "message": "Person group is not found."}}"#;
        let err = decode_body::<PersonGroup>(StatusCode::NOT_FOUND, json).unwrap_err();
        assert!(err.is_group_not_found());
        assert!(err.to_string().contains("Person group is not found."));

        // an error object wins even on a 200
        let err = decode_body::<Vec<DetectedFace>>(
            StatusCode::OK,
            r#"{"error": {"code": "Unspecified", "message": "Invalid subscription Key"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), Some("Unspecified"));
        assert!(!err.is_group_not_found());
    }

    #[test]
    fn test_non_json_failure_keeps_status() {
        let err = decode_body::<PersonGroup>(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert_eq!(err.code(), Some("502"));
    }

    #[test]
    fn test_garbage_success_is_decode_error() {
        let err = decode_body::<Vec<Person>>(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, ApiClientError::DecodeError(_)));
    }

    #[test]
    fn test_person_smiling_is_local_only() {
        let mut person = Person::new("p1", "Alice");
        person.smiling = Some(0.5);
        let json = serde_json::to_string(&person).unwrap();
        assert!(!json.contains("smiling"));
        let parsed: Person = serde_json::from_str(
            r#"{"personId": "p1", "name": "Alice", "persistedFaceIds": ["a"], "smiling": 1.0}"#,
        )
        .unwrap();
        assert_eq!(parsed.smiling, None);
        assert_eq!(parsed.persisted_face_ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_rectangle_parse_and_display() {
        let rect: FaceRectangle = "1, 2,30,40".parse().unwrap();
        assert_eq!(
            rect,
            FaceRectangle { left: 1, top: 2, width: 30, height: 40 }
        );
        assert_eq!(rect.to_string(), "1,2,30,40");
        assert!("1,2,3".parse::<FaceRectangle>().is_err());
        assert!("a,b,c,d".parse::<FaceRectangle>().is_err());
    }
}
