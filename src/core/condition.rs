//! Step condition model

use crate::core::trigger::GitRef;
use anyhow::Result;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static STARTS_WITH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^startsWith\(\s*github\.ref\s*,\s*'([^']*)'\s*\)$")
        .expect("valid startsWith pattern")
});

static REF_EQUALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^github\.ref\s*==\s*'([^']*)'$").expect("valid ref comparison pattern")
});

/// Condition guarding a step (`if:` in YAML)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Run when every previous step succeeded (the default)
    Success,
    /// Run even after a previous step failed
    Always,
    /// `startsWith(github.ref, '<prefix>')`
    RefStartsWith(String),
    /// `github.ref == '<ref>'`
    RefEquals(String),
    /// `!<condition>`
    Not(Box<Condition>),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Success
    }
}

impl Condition {
    /// Parse a condition expression, with or without `${{ }}`
    pub fn parse(expression: &str) -> Result<Self> {
        let mut expr = expression.trim();
        if let Some(inner) = expr
            .strip_prefix("${{")
            .and_then(|rest| rest.strip_suffix("}}"))
        {
            expr = inner.trim();
        }

        if let Some(rest) = expr.strip_prefix('!') {
            return Ok(Condition::Not(Box::new(Self::parse(rest)?)));
        }

        match expr {
            "success()" => return Ok(Condition::Success),
            "always()" => return Ok(Condition::Always),
            _ => {}
        }

        if let Some(caps) = STARTS_WITH.captures(expr) {
            return Ok(Condition::RefStartsWith(caps[1].to_string()));
        }

        if let Some(caps) = REF_EQUALS.captures(expr) {
            return Ok(Condition::RefEquals(caps[1].to_string()));
        }

        anyhow::bail!("Unsupported condition expression: {}", expression)
    }

    /// Whether the step still runs once an earlier step has failed
    pub fn runs_after_failure(&self) -> bool {
        matches!(self, Condition::Always)
    }

    /// Evaluate against the triggering ref
    pub fn evaluate(&self, git_ref: &GitRef) -> bool {
        match self {
            Condition::Success | Condition::Always => true,
            Condition::RefStartsWith(prefix) => git_ref.full().starts_with(prefix.as_str()),
            Condition::RefEquals(expected) => git_ref.full() == *expected,
            Condition::Not(inner) => !inner.evaluate(git_ref),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Success => write!(f, "success()"),
            Condition::Always => write!(f, "always()"),
            Condition::RefStartsWith(prefix) => write!(f, "startsWith(github.ref, '{}')", prefix),
            Condition::RefEquals(expected) => write!(f, "github.ref == '{}'", expected),
            Condition::Not(inner) => write!(f, "!{}", inner),
        }
    }
}
