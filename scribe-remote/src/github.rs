//! GitHub contents API adapter.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use scribe_core::remote::{
    decode_text, encode_text, EntryKind, RemoteEntry, RemoteFile, RepoReader, RepoWriter,
    WriteReceipt, WriteRequest,
};
use scribe_core::{RemoteError, RepoRef};

const GITHUB_JSON: &str = "application/vnd.github+json";

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ContentsFile {
    #[serde(rename = "type")]
    kind: String,
    encoding: Option<String>,
    content: Option<String>,
    sha: String,
}

#[derive(Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GitHubClient {
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self, RemoteError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| RemoteError::transport(None, format!("invalid API base {api_base:?}: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| RemoteError::transport(None, e.to_string()))?;
        Ok(Self { http, api_base, token })
    }

    /// `{api}/repos/{owner}/{repo}/contents/{path}?ref={branch}` with every
    /// segment percent-encoded on its own.
    pub fn contents_url(&self, repo: &RepoRef, path: &str) -> Result<Url, RemoteError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::transport(None, "API base cannot carry a path"))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        url.query_pairs_mut().append_pair("ref", &repo.branch);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url).header(ACCEPT, GITHUB_JSON);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str, writing: bool) -> Result<Response, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.status().map(|s| s.as_u16()), e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, path, writing))
    }
}

/// Maps a non-2xx response onto the error taxonomy. A rejected write
/// precondition (409, or 422 complaining about the sha) becomes a conflict.
pub fn classify_failure(status: StatusCode, body: &str, path: &str, writing: bool) -> RemoteError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    let sha_mismatch = status == StatusCode::UNPROCESSABLE_ENTITY && message.to_lowercase().contains("sha");
    if writing && (status == StatusCode::CONFLICT || sha_mismatch) {
        return RemoteError::Conflict { path: path.to_owned() };
    }
    RemoteError::transport(Some(status.as_u16()), format!("{path}: {message} ({})", status.as_u16()))
}

fn transport_decode(path: &str, err: reqwest::Error) -> RemoteError {
    RemoteError::transport(None, format!("{path}: unexpected response: {err}"))
}

#[async_trait]
impl RepoReader for GitHubClient {
    async fn list(&self, repo: &RepoRef, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let url = self.contents_url(repo, path)?;
        tracing::debug!(%url, "listing directory");
        let response = self.send(self.request(Method::GET, url), path, false).await?;
        let value: serde_json::Value = response.json().await.map_err(|e| transport_decode(path, e))?;
        if !value.is_array() {
            return Err(RemoteError::transport(None, format!("{path:?} is not a directory")));
        }
        let entries: Vec<ContentsEntry> = serde_json::from_value(value)
            .map_err(|e| RemoteError::transport(None, format!("{path}: unexpected listing: {e}")))?;
        Ok(entries
            .into_iter()
            .map(|e| RemoteEntry {
                kind: if e.kind == "dir" { EntryKind::Directory } else { EntryKind::File },
                name: e.name,
                path: e.path,
                revision: e.sha,
                size: e.size,
            })
            .collect())
    }

    async fn read(&self, repo: &RepoRef, path: &str) -> Result<RemoteFile, RemoteError> {
        let url = self.contents_url(repo, path)?;
        tracing::debug!(%url, "reading file");
        let response = self.send(self.request(Method::GET, url), path, false).await?;
        let file: ContentsFile = response.json().await.map_err(|e| transport_decode(path, e))?;
        if file.kind != "file" {
            return Err(RemoteError::transport(None, format!("{path:?} is not a file")));
        }
        match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(content)) => Ok(RemoteFile {
                text: decode_text(path, content)?,
                revision: file.sha,
            }),
            (encoding, _) => Err(RemoteError::Decode {
                path: path.to_owned(),
                reason: format!("unsupported encoding {encoding:?}"),
            }),
        }
    }
}

#[async_trait]
impl RepoWriter for GitHubClient {
    async fn write(&self, request: &WriteRequest) -> Result<WriteReceipt, RemoteError> {
        let url = self.contents_url(&request.repo, &request.path)?;
        let body = PutBody {
            message: &request.message,
            content: encode_text(&request.text),
            sha: &request.expected_revision,
            branch: &request.repo.branch,
        };
        tracing::debug!(%url, bytes = request.text.len(), "writing file");
        let response = self
            .send(self.request(Method::PUT, url).json(&body), &request.path, true)
            .await?;
        let receipt: PutResponse = response.json().await.map_err(|e| transport_decode(&request.path, e))?;
        Ok(WriteReceipt { revision: receipt.content.sha })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(base, None).unwrap()
    }

    #[test]
    fn contents_url_encodes_segments_and_branch() {
        let repo = RepoRef::new("octo", "handbook", Some("feature/x"));
        let url = client("https://api.github.com")
            .contents_url(&repo, "docs/my notes/ü.md")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/handbook/contents/docs/my%20notes/%C3%BC.md?ref=feature%2Fx"
        );
    }

    #[test]
    fn root_listing_and_enterprise_base() {
        let repo = RepoRef::new("octo", "handbook", None);
        let url = client("https://ghe.example.com/api/v3/").contents_url(&repo, "").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/handbook/contents?ref=main"
        );
    }

    #[test]
    fn write_precondition_failures_are_conflicts() {
        let conflict = RemoteError::Conflict { path: "a.md".into() };
        assert_eq!(classify_failure(StatusCode::CONFLICT, "{}", "a.md", true), conflict);
        assert_eq!(
            classify_failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#,
                "a.md",
                true
            ),
            conflict
        );
    }

    #[test]
    fn other_failures_are_transport_with_github_message() {
        let err = classify_failure(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#, "a.md", false);
        assert_eq!(err, RemoteError::transport(Some(404), "a.md: Not Found (404)"));
        let err = classify_failure(StatusCode::BAD_GATEWAY, "<html>", "a.md", true);
        assert_eq!(err, RemoteError::transport(Some(502), "a.md: Bad Gateway (502)"));
    }
}
