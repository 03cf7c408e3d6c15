//! Trigger model: git refs, events, and the tag/branch gate

use crate::core::config::TriggerConfig;
use glob_match::glob_match;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fully-qualified git reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GitRef {
    /// `refs/tags/<name>`
    Tag(String),
    /// `refs/heads/<name>`
    Branch(String),
    /// Any other ref, kept verbatim
    Other(String),
}

impl GitRef {
    pub fn parse(reference: &str) -> Self {
        if let Some(name) = reference.strip_prefix("refs/tags/") {
            GitRef::Tag(name.to_string())
        } else if let Some(name) = reference.strip_prefix("refs/heads/") {
            GitRef::Branch(name.to_string())
        } else {
            GitRef::Other(reference.to_string())
        }
    }

    pub fn tag(name: &str) -> Self {
        GitRef::Tag(name.to_string())
    }

    pub fn branch(name: &str) -> Self {
        GitRef::Branch(name.to_string())
    }

    /// The full ref, as exposed in `${{ github.ref }}`
    pub fn full(&self) -> String {
        match self {
            GitRef::Tag(name) => format!("refs/tags/{}", name),
            GitRef::Branch(name) => format!("refs/heads/{}", name),
            GitRef::Other(reference) => reference.clone(),
        }
    }

    /// The short name, as exposed in `${{ github.ref_name }}`
    pub fn name(&self) -> &str {
        match self {
            GitRef::Tag(name) | GitRef::Branch(name) | GitRef::Other(name) => name,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, GitRef::Tag(_))
    }

    /// Tag name, if this is a tag
    pub fn tag_name(&self) -> Option<&str> {
        match self {
            GitRef::Tag(name) => Some(name),
            _ => None,
        }
    }
}

impl FromStr for GitRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GitRef::parse(s))
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full())
    }
}

/// What started a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A ref was pushed
    Push(GitRef),
    /// Started by hand against a ref
    Manual(GitRef),
}

impl Event {
    pub fn git_ref(&self) -> &GitRef {
        match self {
            Event::Push(git_ref) | Event::Manual(git_ref) => git_ref,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Push(git_ref) => write!(f, "push {}", git_ref),
            Event::Manual(git_ref) => write!(f, "manual run on {}", git_ref),
        }
    }
}

/// Activation gate for a workflow
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    /// Globs matched against tag names (e.g. `v*`)
    pub tags: Vec<String>,
    /// Globs matched against branch names
    pub branches: Vec<String>,
    /// Whether manual runs are allowed
    pub manual: bool,
}

impl Trigger {
    pub fn from_config(config: &TriggerConfig) -> Self {
        let (tags, branches) = match &config.push {
            Some(push) => (push.tags.clone(), push.branches.clone()),
            None => (Vec::new(), Vec::new()),
        };

        Trigger {
            tags,
            branches,
            manual: config.workflow_dispatch,
        }
    }

    /// Whether `event` activates the workflow
    pub fn matches(&self, event: &Event) -> bool {
        match event {
            Event::Push(GitRef::Tag(name)) => self.tags.iter().any(|p| glob_match(p, name)),
            Event::Push(GitRef::Branch(name)) => {
                self.branches.iter().any(|p| glob_match(p, name))
            }
            Event::Push(GitRef::Other(_)) => false,
            Event::Manual(_) => self.manual,
        }
    }
}
