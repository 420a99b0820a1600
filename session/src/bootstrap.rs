use crate::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// No usable key; nothing was requested.
    NoKey,
    /// The group did not exist and was created empty.
    Created,
    /// The group existed; the registry now holds this many persons.
    Loaded(usize),
    /// The group could not be fetched or created; the registry was cleared.
    Failed(String),
}

impl Session {
    /// Make sure the person group exists remotely and hydrate the registry
    /// from it. The group id is persisted only after the service confirmed
    /// the group exists or created it.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn ensure_group(&self) -> BootstrapOutcome {
        if !self.check_key() {
            tracing::warn!("No usable API key, skipping group setup");
            return BootstrapOutcome::NoKey;
        }

        let group_id = self.group_id();
        match self.service.get_group(&group_id).await {
            Ok(_) => {
                self.persist_group_id(&group_id);
                match self.service.list_persons(&group_id).await {
                    Ok(persons) => {
                        let count = persons.len();
                        self.with_state(|s| {
                            s.persons = persons;
                            s.selected = None;
                        });
                        tracing::info!(group_id = %group_id, persons = count, "Loaded person group");
                        BootstrapOutcome::Loaded(count)
                    }
                    Err(e) => self.bootstrap_failed(e.to_string()),
                }
            }
            Err(e) if e.is_group_not_found() => {
                match self.service.create_group(&group_id).await {
                    Ok(_) => {
                        self.with_state(|s| s.clear_registry());
                        self.persist_group_id(&group_id);
                        tracing::info!(group_id = %group_id, "Created person group");
                        BootstrapOutcome::Created
                    }
                    Err(e) => self.bootstrap_failed(e.to_string()),
                }
            }
            Err(e) => self.bootstrap_failed(e.to_string()),
        }
    }

    fn bootstrap_failed(&self, reason: String) -> BootstrapOutcome {
        tracing::error!(error = %reason, "Person group setup failed, clearing registry");
        self.with_state(|s| s.clear_registry());
        BootstrapOutcome::Failed(reason)
    }
}
