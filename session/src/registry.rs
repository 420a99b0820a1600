use crate::{BootstrapOutcome, Session, SessionError};
use api_client::{FaceRectangle, Person};

impl Session {
    pub fn select_person(&self, index: usize) -> Result<(), SessionError> {
        self.with_state(|s| {
            if index >= s.persons.len() {
                return Err(SessionError::NoSuchPerson(index));
            }
            s.selected = Some(index);
            s.errors.none_selected = false;
            Ok(())
        })
    }

    /// Create a person remotely and append it to the registry.
    ///
    /// The registry is not reconciled against the service afterwards; if the
    /// create fails there is no id to append and the registry is unchanged.
    pub async fn add_person(
        &self,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<Person, SessionError> {
        let group_id = self.group_id();
        let mut person = self
            .service
            .create_person(&group_id, name, user_data)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, name, "Failed to create person");
                e
            })?;
        person.persisted_face_ids.clear();
        person.smiling = None;

        self.with_state(|s| s.persons.push(person.clone()));
        tracing::info!(person_id = %person.person_id, name, "Person added");
        Ok(person)
    }

    /// Remove the person at `index` locally and delete it remotely.
    ///
    /// The local removal stands even if the remote delete fails. The model is
    /// not retrained, so later cycles may still be matched to the removed id.
    pub async fn remove_person(&self, index: usize) -> Result<Person, SessionError> {
        let (group_id, person) = self.with_state(|s| {
            if index >= s.persons.len() {
                return Err(SessionError::NoSuchPerson(index));
            }
            let person = s.persons.remove(index);
            s.selected = match s.selected {
                Some(sel) if sel == index => None,
                Some(sel) if sel > index => Some(sel - 1),
                other => other,
            };
            Ok((s.group_id.clone(), person))
        })?;

        tracing::info!(person_id = %person.person_id, name = %person.name, "Person removed");
        self.service
            .delete_person(&group_id, &person.person_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, person_id = %person.person_id, "Remote delete failed");
                e
            })?;
        Ok(person)
    }

    /// Capture a frame and register it as a face of the selected person.
    ///
    /// With nothing selected this only raises `none_selected`. Otherwise
    /// `need_train` is raised before anything is submitted.
    pub async fn add_face_to_selected(
        &self,
        rectangle: Option<FaceRectangle>,
    ) -> Result<String, SessionError> {
        let target = self.with_state(|s| {
            let target = s
                .selected_person()
                .map(|p| (s.group_id.clone(), p.person_id.clone()));
            match target {
                Some(t) => {
                    s.errors.none_selected = false;
                    s.errors.need_train = true;
                    Some(t)
                }
                None => {
                    s.errors.none_selected = true;
                    None
                }
            }
        });
        let Some((group_id, person_id)) = target else {
            tracing::warn!("Add face requested with no person selected");
            return Err(SessionError::NoneSelected);
        };

        let frame = self.capture.capture().await?;
        let face = self
            .service
            .add_person_face(&group_id, &person_id, frame, rectangle)
            .await?;

        self.with_state(|s| {
            if let Some(person) = s.persons.iter_mut().find(|p| p.person_id == person_id) {
                if !face.persisted_face_id.is_empty() {
                    person.persisted_face_ids.push(face.persisted_face_id.clone());
                }
            }
        });
        tracing::info!(person_id = %person_id, face_id = %face.persisted_face_id, "Face added");
        Ok(face.persisted_face_id)
    }

    /// Start training. `need_train` is cleared up front and stays cleared
    /// even if the request fails.
    pub async fn train(&self) -> Result<(), SessionError> {
        let group_id = self.with_state(|s| {
            s.errors.need_train = false;
            s.group_id.clone()
        });
        self.service.train_group(&group_id).await.map_err(|e| {
            tracing::error!(error = %e, "Training request failed");
            e
        })?;
        tracing::info!(group_id = %group_id, "Training started");
        Ok(())
    }

    /// Store a new key, hand it to the client and redo group setup.
    pub async fn set_api_key(&self, key: &str) -> BootstrapOutcome {
        if let Err(e) = self.settings.set_api_key(key) {
            tracing::error!(error = %e, "Failed to persist API key");
        }
        self.service.set_key(key);
        self.with_state(|s| s.api_key = key.to_string());
        self.ensure_group().await
    }
}
