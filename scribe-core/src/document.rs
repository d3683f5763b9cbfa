//! The currently open document.
//!
//! `DocumentSession` is a small state machine:
//!
//! ```text
//! Idle -> Loading -> Ready -> Loading (switch) -> Ready
//!                    Ready(dirty) -> Saving -> Ready(clean)
//! ```
//!
//! Every transition is split into a synchronous `begin_*` step that checks
//! and claims the session, an async `execute_*` step that only talks to the
//! remote, and a synchronous `finish_*` step that installs the result. The
//! terminal shell runs the middle step on a background task; [`select`] and
//! [`save`] chain all three for callers that can simply await.
//!
//! [`select`]: DocumentSession::select
//! [`save`]: DocumentSession::save

use crate::error::{DocumentError, RemoteError};
use crate::locator::RepoRef;
use crate::now_secs;
use crate::patch::{apply_patch, AppliedPatch, PatchProposal};
use crate::remote::{RemoteFile, RepoStore, WriteReceipt, WriteRequest};
use crate::tree::TreeNode;

/// Commit message used when none is configured. `{name}` and `{path}` are
/// replaced with the document's file name and path.
pub const DEFAULT_COMMIT_TEMPLATE: &str = "Update {name}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Saving,
}

/// Text and bookkeeping for the one open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub path: String,
    pub name: String,
    live: String,
    original: String,
    /// `None` when the load failed; such a document is read-only.
    revision: Option<String>,
    dirty: bool,
    last_saved_at: Option<i64>,
}

impl OpenDocument {
    fn loaded(path: String, name: String, file: RemoteFile) -> Self {
        Self {
            path,
            name,
            live: file.text.clone(),
            original: file.text,
            revision: Some(file.revision),
            dirty: false,
            last_saved_at: None,
        }
    }

    fn failed(path: String, name: String) -> Self {
        Self {
            path,
            name,
            live: String::new(),
            original: String::new(),
            revision: None,
            dirty: false,
            last_saved_at: None,
        }
    }

    /// The live (possibly edited) text.
    pub fn text(&self) -> &str {
        &self.live
    }

    /// The text as of the last successful load or save.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_loaded(&self) -> bool {
        self.revision.is_some()
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.last_saved_at
    }
}

/// What [`DocumentSession::begin_select`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectPlan {
    /// Nothing to do: the node is a directory, or it is already open, loaded
    /// and clean.
    Unchanged,
    /// Save the previous document (if dirty), then load the new one.
    Switch(SwitchRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    pub repo: RepoRef,
    pub path: String,
    pub name: String,
    /// The implicit save of the previously open, dirty document.
    pub save: Option<WriteRequest>,
}

/// A write that was attempted, paired with its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveAttempt {
    pub request: WriteRequest,
    pub result: Result<WriteReceipt, RemoteError>,
}

/// Everything the remote said during a switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchResult {
    pub path: String,
    pub name: String,
    pub saved: Option<SaveAttempt>,
    pub load: Result<RemoteFile, RemoteError>,
}

/// What the user needs to hear about a completed switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectReport {
    /// `false` when the selection was a no-op.
    pub switched: bool,
    /// The implicit save failed; the previous document's edits were dropped.
    pub save_error: Option<RemoteError>,
    /// The new document could not be loaded and is shown empty.
    pub load_error: Option<RemoteError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was open, or the document was clean.
    Clean,
    Saved { revision: String },
}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    repo: Option<RepoRef>,
    phase: DocumentPhase,
    current: Option<OpenDocument>,
    commit_template: String,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSession {
    pub fn new() -> Self {
        Self {
            repo: None,
            phase: DocumentPhase::Idle,
            current: None,
            commit_template: DEFAULT_COMMIT_TEMPLATE.to_owned(),
        }
    }

    pub fn with_commit_template(mut self, template: impl Into<String>) -> Self {
        self.commit_template = template.into();
        self
    }

    /// Closes any open document and points the session at `repo`.
    pub fn reset(&mut self, repo: RepoRef) {
        self.repo = Some(repo);
        self.phase = DocumentPhase::Idle;
        self.current = None;
    }

    pub fn phase(&self) -> DocumentPhase {
        self.phase
    }

    pub fn current(&self) -> Option<&OpenDocument> {
        self.current.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, DocumentPhase::Loading | DocumentPhase::Saving)
    }

    pub fn is_dirty(&self) -> bool {
        self.current.as_ref().is_some_and(OpenDocument::is_dirty)
    }

    /// Replaces the live text. Returns `false` (and changes nothing) while a
    /// load or save is in flight, or when no successfully loaded document is
    /// open.
    pub fn edit(&mut self, text: impl Into<String>) -> bool {
        if self.is_busy() {
            return false;
        }
        let Some(doc) = self.current.as_mut().filter(|d| d.is_loaded()) else {
            return false;
        };
        doc.live = text.into();
        doc.dirty = doc.live != doc.original;
        true
    }

    /// Applies `proposal` to the live text as it is right now and installs
    /// the result as an edit, leaving the document dirty.
    pub fn replace_with_patch(&mut self, proposal: &PatchProposal) -> Result<AppliedPatch, DocumentError> {
        if self.is_busy() {
            return Err(DocumentError::Busy);
        }
        let doc = self.current.as_ref().ok_or(DocumentError::NoDocument)?;
        if !doc.is_loaded() {
            return Err(DocumentError::NotLoaded { path: doc.path.clone() });
        }
        let applied = apply_patch(&doc.live, proposal)?;
        self.edit(applied.text.clone());
        Ok(applied)
    }

    /// Claims the session for a switch to `node`.
    pub fn begin_select(&mut self, node: &TreeNode) -> Result<SelectPlan, DocumentError> {
        if node.is_dir() {
            return Ok(SelectPlan::Unchanged);
        }
        if self.is_busy() {
            return Err(DocumentError::Busy);
        }
        let repo = self
            .repo
            .clone()
            .ok_or_else(|| RemoteError::transport(None, "no repository is open"))?;

        // A document whose load failed is re-read when selected again.
        if let Some(doc) = &self.current {
            if doc.path == node.path && !doc.dirty && doc.is_loaded() {
                return Ok(SelectPlan::Unchanged);
            }
        }

        let save = match &self.current {
            Some(doc) if doc.dirty => self.write_request(doc),
            _ => None,
        };
        self.phase = DocumentPhase::Loading;
        Ok(SelectPlan::Switch(SwitchRequest {
            repo,
            path: node.path.clone(),
            name: node.name.clone(),
            save,
        }))
    }

    /// Performs the remote half of a switch: the implicit save resolves
    /// (either way) before the read starts.
    pub async fn execute_switch(store: &dyn RepoStore, request: SwitchRequest) -> SwitchResult {
        let saved = match request.save {
            Some(save) => {
                let result = store.write(&save).await;
                if let Err(err) = &result {
                    tracing::warn!(path = %save.path, error = %err, "save before switching documents failed");
                }
                Some(SaveAttempt { request: save, result })
            }
            None => None,
        };
        let load = store.read(&request.repo, &request.path).await;
        SwitchResult { path: request.path, name: request.name, saved, load }
    }

    /// Installs the outcome of a switch.
    pub fn finish_select(&mut self, result: SwitchResult) -> SelectReport {
        self.phase = DocumentPhase::Ready;
        let save_error = match result.saved {
            Some(SaveAttempt { result: Err(err), .. }) => Some(err),
            Some(SaveAttempt { request, result: Ok(receipt) }) => {
                tracing::info!(path = %request.path, revision = %receipt.revision, "saved before switching");
                None
            }
            None => None,
        };
        let load_error = match result.load {
            Ok(file) => {
                tracing::info!(path = %result.path, bytes = file.text.len(), "document loaded");
                self.current = Some(OpenDocument::loaded(result.path, result.name, file));
                None
            }
            Err(err) => {
                tracing::warn!(path = %result.path, error = %err, "document load failed");
                self.current = Some(OpenDocument::failed(result.path, result.name));
                Some(err)
            }
        };
        SelectReport { switched: true, save_error, load_error }
    }

    /// Opens `node`, saving the previous document first when it is dirty.
    pub async fn select(
        &mut self,
        store: &dyn RepoStore,
        node: &TreeNode,
    ) -> Result<SelectReport, DocumentError> {
        match self.begin_select(node)? {
            SelectPlan::Unchanged => Ok(SelectReport::default()),
            SelectPlan::Switch(request) => {
                let result = Self::execute_switch(store, request).await;
                Ok(self.finish_select(result))
            }
        }
    }

    /// Claims the session for a save. `Ok(None)` means there is nothing to
    /// write.
    pub fn begin_save(&mut self) -> Result<Option<WriteRequest>, DocumentError> {
        if self.is_busy() {
            return Err(DocumentError::Busy);
        }
        let Some(doc) = self.current.as_ref().filter(|d| d.dirty) else {
            return Ok(None);
        };
        let request = self
            .write_request(doc)
            .ok_or_else(|| DocumentError::NotLoaded { path: doc.path.clone() })?;
        self.phase = DocumentPhase::Saving;
        Ok(Some(request))
    }

    pub async fn execute_save(store: &dyn RepoStore, request: WriteRequest) -> SaveAttempt {
        let result = store.write(&request).await;
        SaveAttempt { request, result }
    }

    /// Installs the outcome of a save.
    ///
    /// On success the saved text becomes the new baseline and the returned
    /// revision the new precondition. On failure (including a conflict) the
    /// document stays dirty.
    pub fn finish_save(&mut self, attempt: SaveAttempt) -> Result<SaveOutcome, DocumentError> {
        self.phase = DocumentPhase::Ready;
        let receipt = match attempt.result {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(path = %attempt.request.path, error = %err, "save failed");
                return Err(err.into());
            }
        };
        if let Some(doc) = self.current.as_mut().filter(|d| d.path == attempt.request.path) {
            doc.original = attempt.request.text;
            doc.revision = Some(receipt.revision.clone());
            doc.dirty = doc.live != doc.original;
            doc.last_saved_at = Some(now_secs());
        }
        tracing::info!(path = %attempt.request.path, revision = %receipt.revision, "document saved");
        Ok(SaveOutcome::Saved { revision: receipt.revision })
    }

    /// Writes the open document back if it is dirty.
    pub async fn save(&mut self, store: &dyn RepoStore) -> Result<SaveOutcome, DocumentError> {
        match self.begin_save()? {
            None => Ok(SaveOutcome::Clean),
            Some(request) => {
                let attempt = Self::execute_save(store, request).await;
                self.finish_save(attempt)
            }
        }
    }

    fn write_request(&self, doc: &OpenDocument) -> Option<WriteRequest> {
        let repo = self.repo.clone()?;
        let expected_revision = doc.revision.clone()?;
        let message = self
            .commit_template
            .replace("{name}", &doc.name)
            .replace("{path}", &doc.path);
        Some(WriteRequest {
            repo,
            path: doc.path.clone(),
            text: doc.live.clone(),
            expected_revision,
            message,
        })
    }
}
