use api_client::{DetectedFace, IdentifyResult, Person};

/// Label for a face whose best match is missing from the registry.
pub const NEEDS_RETRAINING: &str = "needs retraining";

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub faces: Vec<DetectedFace>,
    /// Faces matched to a person in the registry.
    pub identified: usize,
    /// Some face matched a person the registry no longer holds.
    pub drift: bool,
}

/// Match identification results against the registry.
///
/// Every person's `smiling` is reset first, whether or not identification
/// succeeded. With `identified == None` the faces pass through unlabeled.
/// Only the first candidate of each result is considered; candidates are not
/// re-ranked by confidence.
pub fn reconcile(
    persons: &mut [Person],
    mut faces: Vec<DetectedFace>,
    identified: Option<&[IdentifyResult]>,
) -> Reconciled {
    for person in persons.iter_mut() {
        person.smiling = None;
    }
    for face in faces.iter_mut() {
        face.identified_as = None;
    }

    let mut identified_count = 0;
    let mut drift = false;

    for result in identified.unwrap_or_default() {
        let Some(best) = result.candidates.first() else {
            continue;
        };
        let Some(face) = faces.iter_mut().find(|f| f.face_id == result.face_id) else {
            tracing::debug!(face_id = %result.face_id, "Identify result for unknown face");
            continue;
        };

        match persons.iter_mut().find(|p| p.person_id == best.person_id) {
            Some(person) => {
                face.identified_as = Some(person.name.clone());
                person.smiling = face.smile();
                identified_count += 1;
            }
            None => {
                tracing::warn!(person_id = %best.person_id, "Identified person missing locally, model needs retraining");
                face.identified_as = Some(NEEDS_RETRAINING.to_string());
                drift = true;
            }
        }
    }

    Reconciled {
        faces,
        identified: identified_count,
        drift,
    }
}
