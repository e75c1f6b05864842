//! Reusable instruction blocks prepended to an agent's system prompt.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File looked up when a skill is loaded from a directory.
pub const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
}

impl Skill {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            content: content.into(),
        }
    }

    /// Load a skill from a markdown file or a directory holding `SKILL.md`.
    ///
    /// An optional front-matter block delimited by `---` lines may set
    /// `name:` and `description:`; otherwise the name comes from the path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = if path.is_dir() {
            path.join(SKILL_FILE)
        } else {
            path.to_path_buf()
        };
        let raw = fs::read_to_string(&file).map_err(|source| ConfigError::Io {
            path: file.clone(),
            source,
        })?;

        let fallback_name = if path.is_dir() {
            path.file_name()
        } else {
            path.file_stem()
        }
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "skill".to_string());

        let (front_matter, body) = split_front_matter(&raw);
        let mut skill = Skill::new(fallback_name, body.trim());
        for line in front_matter.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "name" if !value.is_empty() => skill.name = value.to_string(),
                "description" if !value.is_empty() => skill.description = Some(value.to_string()),
                _ => {}
            }
        }

        if skill.content.is_empty() {
            return Err(ConfigError::InvalidSkill {
                path: file,
                reason: "skill body is empty".into(),
            });
        }
        Ok(skill)
    }
}

fn split_front_matter(raw: &str) -> (&str, &str) {
    let trimmed = raw.trim_start();
    let Some(rest) = trimmed.strip_prefix("---") else {
        return ("", raw);
    };
    match rest.find("\n---") {
        Some(end) => {
            let front = &rest[..end];
            let body = &rest[end + 4..];
            (front, body)
        }
        None => ("", raw),
    }
}
