//! Run context - expression values available to a job instance

use crate::core::trigger::GitRef;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// `${{ key }}`
static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid expression pattern")
});

/// Values a job instance can reference through `${{ ... }}`
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The triggering ref
    pub git_ref: GitRef,

    /// Matrix values of this instance
    pub matrix: BTreeMap<String, String>,

    /// Environment label the instance runs on
    pub environment: String,
}

impl RunContext {
    pub fn new(git_ref: GitRef, matrix: BTreeMap<String, String>, environment: String) -> Self {
        Self {
            git_ref,
            matrix,
            environment,
        }
    }

    /// Look up a single expression key
    pub fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "github.ref" => Some(self.git_ref.full()),
            "github.ref_name" => Some(self.git_ref.name().to_string()),
            "runner.label" => Some(self.environment.clone()),
            _ => key
                .strip_prefix("matrix.")
                .and_then(|k| self.matrix.get(k).cloned()),
        }
    }

    /// Substitute known expressions, leaving unknown ones untouched
    pub fn render(&self, template: &str) -> String {
        render_template(template, |key| self.lookup(key))
    }

    /// Environment variables exported to every command of the instance
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("GITHUB_REF".to_string(), self.git_ref.full()),
            ("GITHUB_REF_NAME".to_string(), self.git_ref.name().to_string()),
            ("RUNNER_LABEL".to_string(), self.environment.clone()),
        ];

        for (key, value) in &self.matrix {
            let name = format!("MATRIX_{}", key.to_uppercase().replace('-', "_"));
            vars.push((name, value.clone()));
        }

        vars
    }
}

/// Replace every `${{ key }}` for which `lookup` returns a value
pub fn render_template<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    EXPRESSION
        .replace_all(template, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expression keys referenced by a template
pub fn template_keys(template: &str) -> Vec<String> {
    EXPRESSION
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
