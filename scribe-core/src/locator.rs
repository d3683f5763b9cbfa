//! Repository reference parsing.
//!
//! Accepts the three forms people paste: a GitHub web URL (optionally pointing
//! at `/tree/<branch>`), an SSH remote (`git@github.com:owner/repo.git`), and a
//! bare `owner/repo`. Anything else yields `None`; parsing never errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Branch used when the identifier does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// A structured pointer at one branch of one remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoRef {
    pub fn new(owner: &str, repo: &str, branch: Option<&str>) -> Self {
        Self {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            branch: branch.unwrap_or(DEFAULT_BRANCH).to_owned(),
        }
    }

    /// Stable key used to group persisted conversations by repository.
    pub fn key(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.owner, self.repo, self.branch)
    }
}

/// Parses a repository identifier into a [`RepoRef`].
///
/// Surrounding whitespace and trailing slashes are ignored. A `.git` suffix on
/// the repository name is dropped in every form.
pub fn parse_repo_ref(input: &str) -> Option<RepoRef> {
    let cleaned = input.trim().trim_end_matches('/');
    if cleaned.is_empty() {
        return None;
    }
    parse_web_url(cleaned)
        .or_else(|| parse_ssh(cleaned))
        .or_else(|| parse_bare(cleaned))
}

fn parse_web_url(input: &str) -> Option<RepoRef> {
    let rest = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))?;
    let rest = rest
        .strip_prefix("github.com/")
        .or_else(|| rest.strip_prefix("www.github.com/"))?;
    // Query strings and fragments never carry repository information.
    let rest = rest.split(['?', '#']).next().unwrap_or_default();

    let mut segments = rest.split('/');
    let owner = segments.next().filter(|s| valid_segment(s))?;
    let repo = segments.next().map(strip_git_suffix).filter(|s| valid_segment(s))?;
    let branch = match (segments.next(), segments.next()) {
        (Some("tree"), Some(branch)) if valid_segment(branch) => Some(branch),
        _ => None,
    };
    Some(RepoRef::new(owner, repo, branch))
}

fn parse_ssh(input: &str) -> Option<RepoRef> {
    let rest = input.strip_prefix("git@github.com:")?;
    let (owner, repo) = rest.split_once('/')?;
    let repo = strip_git_suffix(repo);
    if !valid_segment(owner) || !valid_segment(repo) || repo.contains('/') {
        return None;
    }
    Some(RepoRef::new(owner, repo, None))
}

fn parse_bare(input: &str) -> Option<RepoRef> {
    let (owner, repo) = input.split_once('/')?;
    let repo = strip_git_suffix(repo);
    if !valid_segment(owner) || !valid_segment(repo) || repo.contains('/') {
        return None;
    }
    Some(RepoRef::new(owner, repo, None))
}

fn strip_git_suffix(name: &str) -> &str {
    name.strip_suffix(".git").unwrap_or(name)
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(':')
        && !segment.chars().any(char::is_whitespace)
}
