//! In-memory fakes of the remote repository and the language model.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use scribe_core::llm::{ChunkStream, LanguageModel, Prompt, ResponseShape};
use scribe_core::remote::{
    decode_text, encode_text, EntryKind, RemoteEntry, RemoteFile, RepoReader, RepoWriter,
    WriteReceipt, WriteRequest,
};
use scribe_core::{LlmError, RemoteError, RepoRef};

pub fn repo() -> RepoRef {
    RepoRef::new("octo", "handbook", None)
}

/// A repository held as base64 blobs, the way the real transport ships them.
#[derive(Default)]
pub struct FakeRepo {
    files: Mutex<BTreeMap<String, (String, String)>>,
    dirs: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    next_revision: AtomicU64,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.put(path, text);
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.dirs.lock().unwrap().insert(path.to_owned());
        self
    }

    /// Every list/read/write of `path` fails with a transport error.
    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_owned());
    }

    pub fn heal(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    /// Stores `text` at `path` under a fresh revision.
    pub fn put(&self, path: &str, text: &str) -> String {
        let revision = format!("rev-{}", self.next_revision.fetch_add(1, Ordering::SeqCst));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), (encode_text(text), revision.clone()));
        revision
    }

    pub fn text(&self, path: &str) -> Option<String> {
        let files = self.files.lock().unwrap();
        let (encoded, _) = files.get(path)?;
        decode_text(path, encoded).ok()
    }

    pub fn revision(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(_, rev)| rev.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, path: &str) -> Result<(), RemoteError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(RemoteError::transport(Some(500), format!("injected failure for {path:?}")));
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[async_trait]
impl RepoReader for FakeRepo {
    async fn list(&self, _repo: &RepoRef, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.record(format!("list {path}"));
        self.check(path)?;
        let mut entries = Vec::new();
        for dir in self.dirs.lock().unwrap().iter().filter(|d| parent_of(d) == path) {
            entries.push(RemoteEntry {
                name: name_of(dir).to_owned(),
                path: dir.clone(),
                kind: EntryKind::Directory,
                revision: format!("tree-{dir}"),
                size: None,
            });
        }
        for (file, (encoded, revision)) in self.files.lock().unwrap().iter() {
            if parent_of(file) == path {
                entries.push(RemoteEntry {
                    name: name_of(file).to_owned(),
                    path: file.clone(),
                    kind: EntryKind::File,
                    revision: revision.clone(),
                    size: Some(encoded.len() as u64),
                });
            }
        }
        Ok(entries)
    }

    async fn read(&self, _repo: &RepoRef, path: &str) -> Result<RemoteFile, RemoteError> {
        self.record(format!("read {path}"));
        self.check(path)?;
        let (encoded, revision) = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::transport(Some(404), "Not Found"))?;
        Ok(RemoteFile { text: decode_text(path, &encoded)?, revision })
    }
}

#[async_trait]
impl RepoWriter for FakeRepo {
    async fn write(&self, request: &WriteRequest) -> Result<WriteReceipt, RemoteError> {
        self.record(format!("write {}", request.path));
        self.check(&request.path)?;
        if self.revision(&request.path).as_deref() != Some(request.expected_revision.as_str()) {
            return Err(RemoteError::Conflict { path: request.path.clone() });
        }
        let revision = self.put(&request.path, &request.text);
        Ok(WriteReceipt { revision })
    }
}

/// Scripted language model: each call pops the next scripted reply.
#[derive(Default)]
pub struct FakeModel {
    streams: Mutex<VecDeque<Vec<Result<String, LlmError>>>>,
    completions: Mutex<VecDeque<Result<Option<String>, LlmError>>>,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_reply(self, chunks: Vec<Result<String, LlmError>>) -> Self {
        self.streams.lock().unwrap().push_back(chunks);
        self
    }

    pub fn complete_reply(self, reply: Result<Option<String>, LlmError>) -> Self {
        self.completions.lock().unwrap().push_back(reply);
        self
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

pub fn chunks(parts: &[&str]) -> Vec<Result<String, LlmError>> {
    parts.iter().map(|p| Ok((*p).to_owned())).collect()
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn stream(&self, prompt: Prompt) -> Result<ChunkStream, LlmError> {
        self.prompts.lock().unwrap().push(prompt);
        let chunks = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn complete(&self, prompt: Prompt, _shape: &ResponseShape) -> Result<Option<String>, LlmError> {
        self.prompts.lock().unwrap().push(prompt);
        self.completions.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}
