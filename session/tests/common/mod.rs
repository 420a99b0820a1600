#![allow(dead_code)]

use api_client::{
    ApiClientError, Candidate, DetectedFace, FaceAttributes, FaceRectangle, IdentifyResult,
    PersistedFace, Person, PersonGroup, RecognitionService, TrainingStatus,
};
use async_trait::async_trait;
use capture::StaticCapture;
use session::Session;
use settings::{MemorySettingsStore, StoredSettings};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const KEY: &str = "valid-key";
pub const GROUP: &str = "group-1";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupState {
    Exists,
    Missing,
    Unauthorized,
}

fn service_error(code: &str) -> ApiClientError {
    ApiClientError::ServiceError {
        code: code.to_string(),
        message: format!("{} from fake", code),
    }
}

/// Programmable stand-in for the face API. Every call is logged by name.
pub struct FakeService {
    pub calls: Mutex<Vec<String>>,
    pub key: Mutex<String>,
    pub group: Mutex<GroupState>,
    pub remote_persons: Mutex<Vec<Person>>,
    /// `None` answers detect with a service error.
    pub detect: Mutex<Option<Vec<DetectedFace>>>,
    /// `None` answers identify with a service error.
    pub identify: Mutex<Option<Vec<IdentifyResult>>>,
    pub fail_create_person: Mutex<bool>,
    pub fail_delete: Mutex<bool>,
    pub fail_train: Mutex<bool>,
    /// When set, identify is recorded and then waits for one notification.
    pub identify_gate: Mutex<Option<Arc<Notify>>>,
    next_id: Mutex<u32>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeService {
            calls: Mutex::new(Vec::new()),
            key: Mutex::new(String::new()),
            group: Mutex::new(GroupState::Exists),
            remote_persons: Mutex::new(Vec::new()),
            detect: Mutex::new(Some(Vec::new())),
            identify: Mutex::new(Some(Vec::new())),
            fail_create_person: Mutex::new(false),
            fail_delete: Mutex::new(false),
            fail_train: Mutex::new(false),
            identify_gate: Mutex::new(None),
            next_id: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl RecognitionService for FakeService {
    fn set_key(&self, key: &str) {
        *self.key.lock().unwrap() = key.to_string();
    }

    async fn detect_faces(&self, _image: Vec<u8>) -> Result<Vec<DetectedFace>, ApiClientError> {
        self.record("detect");
        self.detect.lock().unwrap().clone().ok_or_else(|| service_error("BadArgument"))
    }

    async fn identify_faces(
        &self,
        _group_id: &str,
        _face_ids: &[String],
    ) -> Result<Vec<IdentifyResult>, ApiClientError> {
        self.record("identify");
        let gate = self.identify_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.identify
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| service_error("PersonGroupNotTrained"))
    }

    async fn get_group(&self, group_id: &str) -> Result<PersonGroup, ApiClientError> {
        self.record("get_group");
        match *self.group.lock().unwrap() {
            GroupState::Exists => Ok(PersonGroup {
                person_group_id: group_id.to_string(),
                name: group_id.to_string(),
                user_data: None,
            }),
            GroupState::Missing => Err(service_error("PersonGroupNotFound")),
            GroupState::Unauthorized => Err(service_error("Unspecified")),
        }
    }

    async fn create_group(&self, group_id: &str) -> Result<PersonGroup, ApiClientError> {
        self.record("create_group");
        *self.group.lock().unwrap() = GroupState::Exists;
        Ok(PersonGroup {
            person_group_id: group_id.to_string(),
            name: group_id.to_string(),
            user_data: None,
        })
    }

    async fn train_group(&self, _group_id: &str) -> Result<(), ApiClientError> {
        self.record("train");
        if *self.fail_train.lock().unwrap() {
            return Err(service_error("PersonGroupTrainingNotFinished"));
        }
        Ok(())
    }

    async fn training_status(&self, _group_id: &str) -> Result<TrainingStatus, ApiClientError> {
        self.record("training_status");
        Ok(TrainingStatus {
            status: "succeeded".into(),
            ..TrainingStatus::default()
        })
    }

    async fn list_persons(&self, _group_id: &str) -> Result<Vec<Person>, ApiClientError> {
        self.record("list_persons");
        Ok(self.remote_persons.lock().unwrap().clone())
    }

    async fn create_person(
        &self,
        _group_id: &str,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<Person, ApiClientError> {
        self.record("create_person");
        if *self.fail_create_person.lock().unwrap() {
            return Err(service_error("QuotaExceeded"));
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let mut person = Person::new(format!("new-{}", next), name);
        person.user_data = user_data.map(str::to_string);
        self.remote_persons.lock().unwrap().push(person.clone());
        Ok(person)
    }

    async fn delete_person(&self, _group_id: &str, person_id: &str) -> Result<(), ApiClientError> {
        self.record("delete_person");
        if *self.fail_delete.lock().unwrap() {
            return Err(service_error("PersonNotFound"));
        }
        self.remote_persons
            .lock()
            .unwrap()
            .retain(|p| p.person_id != person_id);
        Ok(())
    }

    async fn add_person_face(
        &self,
        _group_id: &str,
        person_id: &str,
        _image: Vec<u8>,
        rectangle: Option<FaceRectangle>,
    ) -> Result<PersistedFace, ApiClientError> {
        let suffix = rectangle.map(|r| format!("@{}", r)).unwrap_or_default();
        self.record(&format!("add_face{}", suffix));
        Ok(PersistedFace {
            persisted_face_id: format!("face-of-{}", person_id),
        })
    }
}

pub fn face(id: &str, smile: f64) -> DetectedFace {
    DetectedFace {
        face_id: id.to_string(),
        face_rectangle: FaceRectangle {
            left: 20,
            top: 10,
            width: 100,
            height: 120,
        },
        face_attributes: Some(FaceAttributes { smile }),
        identified_as: None,
    }
}

pub fn identified(face_id: &str, person_ids: &[&str]) -> IdentifyResult {
    IdentifyResult {
        face_id: face_id.to_string(),
        candidates: person_ids
            .iter()
            .map(|id| Candidate {
                person_id: id.to_string(),
                confidence: 0.9,
            })
            .collect(),
    }
}

pub struct Harness {
    pub session: Session,
    pub service: Arc<FakeService>,
    pub settings: MemorySettingsStore,
    pub capture: StaticCapture,
}

pub fn harness(key: &str, group_id: Option<&str>) -> Harness {
    let service = FakeService::new();
    let settings = MemorySettingsStore::new(StoredSettings {
        api_key: key.to_string(),
        group_id: group_id.map(str::to_string),
    });
    let capture = StaticCapture::new(b"frame".to_vec());
    let session = Session::new(
        service.clone(),
        Arc::new(settings.clone()),
        Arc::new(capture.clone()),
    )
    .expect("session");
    Harness {
        session,
        service,
        settings,
        capture,
    }
}

/// A session whose registry holds `persons`, loaded through bootstrap.
pub async fn loaded_harness(persons: Vec<Person>) -> Harness {
    let h = harness(KEY, Some(GROUP));
    *h.service.remote_persons.lock().unwrap() = persons;
    h.session.ensure_group().await;
    h.service.clear_calls();
    h
}
