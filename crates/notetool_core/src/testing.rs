//! In-memory fakes for the store and fetcher collaborators, shared by the
//! merge and pipeline unit tests.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};

use crate::fetcher::{Article, ContentFetcher};
use crate::store::{AppInfo, NewAttribute, Note, NoteKind, NoteStore};

#[derive(Default)]
pub struct MockStore {
    pub notes: Vec<Note>,
    pub contents: BTreeMap<String, String>,
    /// note_id -> labels attached to the note (for `#label` query answers).
    pub labels: BTreeMap<String, Vec<String>>,
    pub attributes: Vec<NewAttribute>,
    pub patched_titles: Vec<(String, String)>,
    pub deleted: Vec<String>,
    pub revisions_saved: Vec<String>,
    pub fail_delete: BTreeSet<String>,
    pub fail_revision: BTreeSet<String>,
    pub request_count: usize,
}

impl MockStore {
    pub fn add_note(&mut self, note_id: &str, title: &str, created_at: &str, body: &str) {
        self.notes.push(Note {
            note_id: note_id.to_string(),
            title: title.to_string(),
            kind: NoteKind::Text,
            is_protected: false,
            created_at: created_at.to_string(),
            modified_at: created_at.to_string(),
        });
        self.contents.insert(note_id.to_string(), body.to_string());
    }

    pub fn add_label(&mut self, note_id: &str, label: &str) {
        self.labels
            .entry(note_id.to_string())
            .or_default()
            .push(label.to_string());
    }

    pub fn content_of(&self, note_id: &str) -> &str {
        self.contents.get(note_id).map(String::as_str).unwrap_or("")
    }

    fn find(&self, note_id: &str) -> Result<Note> {
        self.notes
            .iter()
            .find(|note| note.note_id == note_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("note {note_id} not found"))
    }
}

impl NoteStore for MockStore {
    fn app_info(&mut self) -> Result<AppInfo> {
        self.request_count += 1;
        Ok(AppInfo {
            app_version: "0.0.0-test".to_string(),
        })
    }

    fn search(&mut self, query: &str) -> Result<Vec<Note>> {
        self.request_count += 1;
        if let Some(rest) = query.strip_prefix("note.title = \"") {
            let title = rest
                .split("\" note.dateCreated")
                .next()
                .unwrap_or_default()
                .replace("\\\"", "\"");
            return Ok(self
                .notes
                .iter()
                .filter(|note| note.title == title)
                .cloned()
                .collect());
        }
        if let Some(rest) = query.strip_prefix("note.noteId = '") {
            let mut parts = rest.splitn(2, "' #");
            let note_id = parts.next().unwrap_or_default();
            let label = parts.next().unwrap_or_default();
            let has_label = self
                .labels
                .get(note_id)
                .is_some_and(|labels| labels.iter().any(|known| known == label));
            if !has_label {
                return Ok(Vec::new());
            }
            return Ok(self
                .notes
                .iter()
                .filter(|note| note.note_id == note_id)
                .cloned()
                .collect());
        }
        // Date-range selection queries return everything; tests control the
        // candidate set directly.
        Ok(self.notes.clone())
    }

    fn get_note(&mut self, note_id: &str) -> Result<Note> {
        self.request_count += 1;
        self.find(note_id)
    }

    fn get_note_content(&mut self, note_id: &str) -> Result<String> {
        self.request_count += 1;
        match self.contents.get(note_id) {
            Some(content) => Ok(content.clone()),
            None => bail!("content of note {note_id} not found"),
        }
    }

    fn update_note_content(&mut self, note_id: &str, body: &str) -> Result<()> {
        self.request_count += 1;
        self.contents.insert(note_id.to_string(), body.to_string());
        Ok(())
    }

    fn patch_note_title(&mut self, note_id: &str, title: &str) -> Result<()> {
        self.request_count += 1;
        if let Some(note) = self.notes.iter_mut().find(|note| note.note_id == note_id) {
            note.title = title.to_string();
        }
        self.patched_titles
            .push((note_id.to_string(), title.to_string()));
        Ok(())
    }

    fn create_attribute(&mut self, attribute: &NewAttribute) -> Result<()> {
        self.request_count += 1;
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn delete_note(&mut self, note_id: &str) -> Result<()> {
        self.request_count += 1;
        if self.fail_delete.contains(note_id) {
            bail!("delete of note {note_id} rejected");
        }
        self.notes.retain(|note| note.note_id != note_id);
        self.contents.remove(note_id);
        self.deleted.push(note_id.to_string());
        Ok(())
    }

    fn save_revision(&mut self, note_id: &str) -> Result<()> {
        self.request_count += 1;
        if self.fail_revision.contains(note_id) {
            bail!("revision of note {note_id} rejected");
        }
        self.revisions_saved.push(note_id.to_string());
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub titles: BTreeMap<String, String>,
    pub articles: BTreeMap<String, Article>,
}

impl FakeFetcher {
    pub fn with_title(mut self, url: &str, title: &str) -> Self {
        self.titles.insert(url.to_string(), title.to_string());
        self
    }

    pub fn with_article(mut self, url: &str, article: Article) -> Self {
        self.titles.insert(url.to_string(), article.title.clone());
        self.articles.insert(url.to_string(), article);
        self
    }
}

impl ContentFetcher for FakeFetcher {
    fn fetch_title(&self, url: &str) -> Option<String> {
        self.titles.get(url).cloned()
    }

    fn fetch_article(&self, url: &str) -> Option<Article> {
        self.articles.get(url).cloned()
    }
}
