//! Dashboard state: the record list and the shared create/edit form.
//!
//! Every mutation is followed by a full reload from the server; the list is
//! never patched locally.

use crate::envelope;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::{Draft, DraftField, MessRecord};
use crate::session::Session;
use anyhow::{anyhow, Result};

const MESSES_PATH: &str = "/messes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created,
    Updated(String),
    /// A required field was empty; nothing was sent
    Invalid,
    /// The server call failed; the draft is kept for another try
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Declined,
    Failed,
}

#[derive(Debug, Default)]
pub struct MessManager {
    records: Vec<MessRecord>,
    draft: Draft,
    editing_id: Option<String>,
    loading: bool,
    error: Option<String>,
}

fn record_path(id: &str) -> String {
    format!("{}/{}", MESSES_PATH, id)
}

impl MessManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MessRecord] {
        &self.records
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn find(&self, id: &str) -> Option<&MessRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Set one draft field by name, as typed.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        let field = DraftField::from_str(name).ok_or_else(|| {
            anyhow!(
                "Unknown field '{}' (expected one of: name, location, price, rating)",
                name
            )
        })?;
        self.draft.set(field, value);
        Ok(())
    }

    /// Replace the list with the server's. On failure the previous list stays.
    pub fn load(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        self.loading = true;
        let result = api
            .get(MESSES_PATH)
            .and_then(|body| envelope::extract_records(&body));
        self.loading = false;

        match result {
            Ok(records) => {
                self.records = records;
                self.error = None;
                Ok(())
            }
            Err(e) => {
                self.report(&e, "Could not load messes");
                Err(e)
            }
        }
    }

    pub fn create(&self, api: &ApiClient, draft: &Draft) -> Result<(), ApiError> {
        api.post(MESSES_PATH, draft.to_json()).map(|_| ())
    }

    /// Full replacement of record `id` with `draft`.
    pub fn update(&self, api: &ApiClient, id: &str, draft: &Draft) -> Result<(), ApiError> {
        api.put(&record_path(id), draft.to_json()).map(|_| ())
    }

    /// Delete `id` once `confirm` agrees, then reload.
    pub fn delete<F>(&mut self, api: &ApiClient, id: &str, confirm: F) -> DeleteOutcome
    where
        F: FnOnce(&str) -> bool,
    {
        self.error = None;
        let prompt = match self.find(id) {
            Some(record) => format!("Delete mess \"{}\" ({})?", record.name, id),
            None => format!("Delete mess {}?", id),
        };
        if !confirm(&prompt) {
            return DeleteOutcome::Declined;
        }

        match api.delete(&record_path(id)) {
            Ok(_) => {
                let _ = api.log().mutation("delete", Some(id), true);
                self.reset_draft();
                let _ = self.load(api);
                DeleteOutcome::Deleted
            }
            Err(e) => {
                let _ = api.log().mutation("delete", Some(id), false);
                self.report(&e, "Could not delete mess");
                DeleteOutcome::Failed
            }
        }
    }

    /// Copy `record` into the draft and switch the form to edit mode.
    pub fn begin_edit(&mut self, record: &MessRecord) {
        self.draft = Draft::from_record(record);
        self.editing_id = Some(record.id.clone());
        self.error = None;
    }

    /// `begin_edit` for a record in the current list.
    pub fn begin_edit_by_id(&mut self, id: &str) -> Result<()> {
        let record = self
            .find(id)
            .cloned()
            .ok_or_else(|| anyhow!("No mess with id '{}' in the current list", id))?;
        self.begin_edit(&record);
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.reset_draft();
        self.error = None;
    }

    /// Update when editing, create otherwise. A successful mutation clears
    /// the draft and edit state before the reload, whatever the reload does.
    pub fn submit(&mut self, api: &ApiClient) -> SubmitOutcome {
        self.error = None;

        let missing = self.draft.missing_fields();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
            self.error = Some(format!("Required: {}", names.join(", ")));
            return SubmitOutcome::Invalid;
        }

        let draft = self.draft.clone();
        let result = match self.editing_id.clone() {
            Some(id) => self
                .update(api, &id, &draft)
                .map(|_| SubmitOutcome::Updated(id)),
            None => self.create(api, &draft).map(|_| SubmitOutcome::Created),
        };

        match result {
            Ok(outcome) => {
                let (action, id) = match &outcome {
                    SubmitOutcome::Updated(id) => ("update", Some(id.as_str())),
                    _ => ("create", None),
                };
                let _ = api.log().mutation(action, id, true);
                self.reset_draft();
                let _ = self.load(api);
                outcome
            }
            Err(e) => {
                let action = if self.editing_id.is_some() { "update" } else { "create" };
                let _ = api.log().mutation(action, self.editing_id.as_deref(), false);
                self.report(&e, "Could not save mess");
                SubmitOutcome::Failed
            }
        }
    }

    /// Drop the session and all local dashboard state.
    pub fn logout(&mut self, session: &Session) -> Result<()> {
        session.clear()?;
        *self = Self::default();
        Ok(())
    }

    fn reset_draft(&mut self) {
        self.draft = Draft::default();
        self.editing_id = None;
    }

    fn report(&mut self, err: &ApiError, fallback: &str) {
        // A rejected session is handled by moving back to the login view
        if !err.is_unauthorized() {
            self.error = Some(err.user_message(fallback));
        }
    }
}
