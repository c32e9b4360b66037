//! Hot-reloaded skill definitions.
//!
//! A skill is a markdown file with YAML front matter, either
//! `<SKILLS_DIR>/<name>/SKILL.md` or `<SKILLS_DIR>/<name>.md`:
//!
//! ```text
//! ---
//! name: contract-review
//! description: Review contract clauses
//! triggers: [合同, 审查, contract]
//! default_writeback: compare_table
//! priority: 5
//! ---
//! Prompt body injected when the skill is selected.
//! ```
//!
//! The registry rescans when the directory signature (file count plus newest
//! modification time) changes, so edits take effect on the next message.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::routing::{Delivery, SkillHint};
use crate::Ah32Error;

/// File name of a skill inside its own directory.
pub const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WritebackSetting {
    Flag(bool),
    Mode(String),
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    triggers: Vec<String>,
    default_writeback: Option<WritebackSetting>,
    #[serde(default)]
    background_tools: Vec<String>,
    #[serde(default)]
    background_triggers: Vec<String>,
    #[serde(default)]
    priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub default_writeback: Option<Delivery>,
    pub background_tools: Vec<String>,
    pub background_triggers: Vec<String>,
    pub priority: i32,
    /// Prompt text after the front matter.
    pub body: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Parse a skill file. The name falls back to the file (or directory) stem.
pub fn parse_skill(path: &Path, content: &str) -> Result<Skill, Ah32Error> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| Ah32Error::Validation(format!("{}: missing front matter", path.display())))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| Ah32Error::Validation(format!("{}: unterminated front matter", path.display())))?;
    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('-').trim().to_string();

    let fm: FrontMatter = serde_yaml_ng::from_str(yaml)
        .map_err(|e| Ah32Error::Validation(format!("{}: invalid front matter: {}", path.display(), e)))?;

    let name = fm
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| fallback_name(path))
        .ok_or_else(|| Ah32Error::Validation(format!("{}: skill has no name", path.display())))?;

    let default_writeback = match fm.default_writeback {
        None | Some(WritebackSetting::Flag(false)) => None,
        Some(WritebackSetting::Flag(true)) => Some(Delivery::Rewrite),
        Some(WritebackSetting::Mode(mode)) => match mode.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "false" => None,
            other => {
                let delivery = Delivery::from_name(other);
                if delivery.is_none() {
                    warn!(skill = %name, mode = %other, "Unknown default_writeback, ignoring");
                }
                delivery
            }
        },
    };

    Ok(Skill {
        name: name.trim().to_string(),
        description: fm.description,
        triggers: fm.triggers,
        default_writeback,
        background_tools: fm.background_tools,
        background_triggers: fm.background_triggers,
        priority: fm.priority,
        body,
        path: path.to_path_buf(),
    })
}

fn fallback_name(path: &Path) -> Option<String> {
    let is_skill_file = path.file_name().and_then(|n| n.to_str()) == Some(SKILL_FILE);
    let source = if is_skill_file { path.parent()? } else { path };
    let stem = if is_skill_file {
        source.file_name()?
    } else {
        source.file_stem()?
    };
    Some(stem.to_string_lossy().into_owned())
}

/// A skill matched against a message.
#[derive(Debug, Clone)]
pub struct SelectedSkill {
    pub skill: Arc<Skill>,
    pub score: i64,
    /// A background trigger matched: tools run without writing back.
    pub background: bool,
}

impl SelectedSkill {
    pub fn hint(&self) -> SkillHint {
        SkillHint {
            name: self.skill.name.clone(),
            default_writeback: self.skill.default_writeback,
            background: self.background,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct DirSignature {
    files: usize,
    newest: Option<SystemTime>,
}

#[derive(Default)]
struct RegistryState {
    /// `None` until the first scan.
    signature: Option<DirSignature>,
    skills: Arc<Vec<Arc<Skill>>>,
}

pub struct SkillRegistry {
    dir: PathBuf,
    state: RwLock<RegistryState>,
}

impl SkillRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn skill_files(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let candidate = path.join(SKILL_FILE);
                if candidate.is_file() {
                    files.push(candidate);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                files.push(path);
            }
        }
        files.sort();
        files
    }

    fn signature(files: &[PathBuf]) -> DirSignature {
        let newest = files
            .iter()
            .filter_map(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok())
            .max();
        DirSignature {
            files: files.len(),
            newest,
        }
    }

    /// Rescan if the directory signature changed.
    ///
    /// # Returns
    ///
    /// `true` if the skill set was reloaded.
    pub fn refresh_if_changed(&self) -> bool {
        let files = self.skill_files();
        let signature = Self::signature(&files);
        {
            let state = match self.state.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.signature == Some(signature) {
                return false;
            }
        }

        let mut skills = Vec::new();
        for path in &files {
            match std::fs::read_to_string(path)
                .map_err(Ah32Error::from)
                .and_then(|content| parse_skill(path, &content))
            {
                Ok(skill) => skills.push(Arc::new(skill)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid skill"),
            }
        }
        info!(dir = %self.dir.display(), count = skills.len(), "Loaded skills");

        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.signature = Some(signature);
        state.skills = Arc::new(skills);
        true
    }

    /// All loaded skills, refreshing first.
    pub fn skills(&self) -> Arc<Vec<Arc<Skill>>> {
        self.refresh_if_changed();
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.skills.clone()
    }

    /// Rank skills by trigger hits against `message`.
    ///
    /// Each trigger hit is worth ten points and `priority` breaks ties.
    /// Skills with no hits are never selected.
    pub fn select(&self, message: &str, limit: usize) -> Vec<SelectedSkill> {
        let lower = message.to_lowercase();
        let hits = |words: &[String]| {
            words
                .iter()
                .filter(|w| !w.trim().is_empty() && lower.contains(&w.to_lowercase()))
                .count() as i64
        };

        let mut selected: Vec<SelectedSkill> = self
            .skills()
            .iter()
            .filter_map(|skill| {
                let trigger_hits = hits(&skill.triggers);
                let background_hits = hits(&skill.background_triggers);
                if trigger_hits + background_hits == 0 {
                    return None;
                }
                Some(SelectedSkill {
                    skill: skill.clone(),
                    score: (trigger_hits + background_hits) * 10 + i64::from(skill.priority),
                    background: background_hits > 0 && trigger_hits == 0,
                })
            })
            .collect();

        selected.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.skill.name.cmp(&b.skill.name))
        });
        selected.truncate(limit);
        debug!(
            selected = ?selected.iter().map(|s| s.skill.name.as_str()).collect::<Vec<_>>(),
            "Skill selection"
        );
        selected
    }
}
