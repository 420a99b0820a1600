use api_client::{DetectedFace, Person};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Level-triggered error conditions shown to the user. Each flag is set or
/// cleared only by the operation that detects or resolves its condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorFlags {
    /// Key missing or too short.
    pub no_key: bool,
    /// Add-face attempted with no person selected.
    pub none_selected: bool,
    /// The trained model no longer matches the registry.
    pub need_train: bool,
}

#[derive(Debug)]
pub struct SessionState {
    pub api_key: String,
    pub group_id: String,
    pub persons: Vec<Person>,
    pub detected_faces: Vec<DetectedFace>,
    pub errors: ErrorFlags,
    pub selected: Option<usize>,
    pub cycles: u64,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Immutable copy of the session handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub group_id: String,
    pub has_key: bool,
    pub persons: Vec<SnapshotPerson>,
    pub detected_faces: Vec<DetectedFace>,
    pub errors: ErrorFlags,
    pub selected: Option<usize>,
    pub cycles: u64,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Registry entry as observers see it, including the local-only `smiling`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotPerson {
    pub person_id: String,
    pub name: String,
    pub user_data: Option<String>,
    pub persisted_faces: usize,
    pub smiling: Option<f64>,
}

impl From<&Person> for SnapshotPerson {
    fn from(p: &Person) -> Self {
        SnapshotPerson {
            person_id: p.person_id.clone(),
            name: p.name.clone(),
            user_data: p.user_data.clone(),
            persisted_faces: p.persisted_face_ids.len(),
            smiling: p.smiling,
        }
    }
}

impl SessionState {
    pub fn new(api_key: String, group_id: String) -> Self {
        SessionState {
            api_key,
            group_id,
            persons: Vec::new(),
            detected_faces: Vec::new(),
            errors: ErrorFlags::default(),
            selected: None,
            cycles: 0,
            last_cycle: None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            group_id: self.group_id.clone(),
            has_key: settings::is_usable_key(&self.api_key),
            persons: self.persons.iter().map(SnapshotPerson::from).collect(),
            detected_faces: self.detected_faces.clone(),
            errors: self.errors,
            selected: self.selected,
            cycles: self.cycles,
            last_cycle: self.last_cycle,
        }
    }

    /// Drop every person and the selection that pointed into them.
    pub fn clear_registry(&mut self) {
        self.persons.clear();
        self.selected = None;
    }

    pub fn selected_person(&self) -> Option<&Person> {
        self.selected.and_then(|i| self.persons.get(i))
    }
}
