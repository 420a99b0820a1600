use crate::{reconcile, Session};
use api_client::{DetectedFace, IdentifyResult};
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::{spawn_local, JoinHandle};
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No usable key: nothing captured or requested, faces left as they were.
    NoKey,
    Completed {
        faces: usize,
        identified: usize,
        drift: bool,
    },
}

/// Running poller. Dropping the handle also stops the loop.
pub struct PollerHandle {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl PollerHandle {
    /// Signal the loop to stop and wait for it. A cycle in progress is
    /// abandoned at its next await point: in-flight requests are dropped,
    /// not awaited, and their results are never applied to the state.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Session {
    /// Capture, detect, identify and publish one set of detected faces.
    ///
    /// Errors from capture or the service never escape: a failed capture or
    /// detect counts as zero faces, a failed identify leaves the faces
    /// unlabeled.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        if !self.check_key() {
            self.with_state(|s| s.cycles += 1);
            tracing::debug!("No usable API key, skipping cycle");
            return CycleOutcome::NoKey;
        }
        let group_id = self.group_id();

        let faces = self.detect().await;
        let identified = self.identify(&group_id, &faces).await;

        self.with_state(|s| {
            let reconciled = reconcile(&mut s.persons, faces, identified.as_deref());
            if reconciled.drift {
                s.errors.need_train = true;
            }
            let outcome = CycleOutcome::Completed {
                faces: reconciled.faces.len(),
                identified: reconciled.identified,
                drift: reconciled.drift,
            };
            s.detected_faces = reconciled.faces;
            s.cycles += 1;
            s.last_cycle = Some(Utc::now());
            outcome
        })
    }

    async fn detect(&self) -> Vec<DetectedFace> {
        let frame = match self.capture.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Frame capture failed");
                return Vec::new();
            }
        };
        match self.service.detect_faces(frame).await {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "Face detection failed");
                Vec::new()
            }
        }
    }

    /// `None` means identification failed and faces stay unlabeled.
    async fn identify(&self, group_id: &str, faces: &[DetectedFace]) -> Option<Vec<IdentifyResult>> {
        if faces.is_empty() {
            return Some(Vec::new());
        }
        let face_ids: Vec<String> = faces.iter().map(|f| f.face_id.clone()).collect();
        match self.service.identify_faces(group_id, &face_ids).await {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!(error = %e, "Face identification failed");
                None
            }
        }
    }

    /// Run a cycle every `interval` on the current `LocalSet`. The wait is
    /// measured from the end of the previous cycle, so at most one cycle is
    /// ever in flight and slow cycles never queue up.
    pub fn start_polling(&self, interval: Duration) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let session = self.clone();
        let handle = spawn_local(async move {
            tracing::info!(interval_ms = interval.as_millis() as u64, "Polling started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    _ = async {
                        sleep(interval).await;
                        let outcome = session.run_cycle().await;
                        tracing::debug!(?outcome, "Cycle finished");
                    } => {}
                }
            }
            tracing::info!("Polling stopped");
        });
        PollerHandle {
            handle,
            shutdown: shutdown_tx,
        }
    }
}
