//! Category-bounded note lists shared by the profile and document stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::classifier::MemoryCategory;
use crate::utils::text::{compact, truncate_chars};

/// Notes kept per category before the oldest is dropped.
pub const MAX_NOTES_PER_CATEGORY: usize = 20;

/// Longest note stored, in characters.
pub const MAX_NOTE_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteBook(BTreeMap<MemoryCategory, Vec<Note>>);

impl NoteBook {
    /// Add a note, keeping at most `max` per category.
    ///
    /// A note equal to an existing one (ignoring punctuation and case) is
    /// moved to the newest position instead of duplicated.
    ///
    /// # Returns
    ///
    /// `true` if the note is new.
    pub fn add(
        &mut self,
        category: MemoryCategory,
        text: &str,
        session_id: Option<&str>,
        max: usize,
    ) -> bool {
        let text = truncate_chars(text.trim(), MAX_NOTE_CHARS);
        if text.is_empty() {
            return false;
        }
        let key = compact(&text);
        let list = self.0.entry(category).or_default();
        let existed = list.iter().position(|n| compact(&n.text) == key);
        if let Some(pos) = existed {
            list.remove(pos);
        }
        list.push(Note {
            text,
            recorded_at: Utc::now(),
            session_id: session_id.map(str::to_string),
        });
        if list.len() > max {
            let excess = list.len() - max;
            list.drain(..excess);
        }
        existed.is_none()
    }

    pub fn get(&self, category: MemoryCategory) -> &[Note] {
        self.0.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Render as `- [category] text` lines, newest `per_category` each.
    pub fn render(&self, per_category: usize) -> String {
        let mut out = String::new();
        for (category, notes) in &self.0 {
            let skip = notes.len().saturating_sub(per_category);
            for note in &notes[skip..] {
                out.push_str(&format!("- [{}] {}\n", category.as_str(), note.text));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_per_category() {
        let mut book = NoteBook::default();
        for i in 0..5 {
            book.add(MemoryCategory::Project, &format!("note {}", i), None, 3);
        }
        book.add(MemoryCategory::Timeline, "deadline friday", None, 3);
        let texts: Vec<_> = book
            .get(MemoryCategory::Project)
            .iter()
            .map(|n| n.text.as_str())
            .collect();
        assert_eq!(texts, vec!["note 2", "note 3", "note 4"]);
        assert_eq!(book.len(), 4);
    }

    #[test]
    fn test_duplicate_moves_to_newest() {
        let mut book = NoteBook::default();
        assert!(book.add(MemoryCategory::Preference, "用宋体", None, 5));
        assert!(book.add(MemoryCategory::Preference, "标题加粗", None, 5));
        assert!(!book.add(MemoryCategory::Preference, "用宋体。", None, 5));
        let notes = book.get(MemoryCategory::Preference);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].text, "用宋体。");
    }

    #[test]
    fn test_render_lines() {
        let mut book = NoteBook::default();
        book.add(MemoryCategory::Identity, "我是张工", None, 5);
        insta::assert_snapshot!(book.render(3).trim_end(), @"- [identity] 我是张工");
    }
}
