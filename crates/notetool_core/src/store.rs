use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::NoteConfig;

/// Note summary as returned by ETAPI search and get endpoints. Timestamps are
/// kept as the store's own ISO-8601 strings; they order correctly under plain
/// string comparison and the calendar day is their 10-character prefix.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub note_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: NoteKind,
    #[serde(default)]
    pub is_protected: bool,
    #[serde(default, rename = "dateCreated")]
    pub created_at: String,
    #[serde(default, rename = "dateModified")]
    pub modified_at: String,
}

impl Note {
    pub fn created_day(&self) -> &str {
        self.created_at.get(..10).unwrap_or(&self.created_at)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub enum NoteKind {
    Text,
    Other(String),
}

impl From<String> for NoteKind {
    fn from(value: String) -> Self {
        if value == "text" {
            Self::Text
        } else {
            Self::Other(value)
        }
    }
}

impl NoteKind {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Label,
    Relation,
}

impl AttributeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Relation => "relation",
        }
    }
}

/// Attribute creation payload. The core only ever adds attributes; existing
/// attributes are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttribute {
    pub note_id: String,
    pub kind: AttributeKind,
    pub name: String,
    pub value: String,
    pub is_inheritable: bool,
}

impl NewAttribute {
    pub fn label(note_id: &str, name: &str, value: &str) -> Self {
        Self {
            note_id: note_id.to_string(),
            kind: AttributeKind::Label,
            name: name.to_string(),
            value: value.to_string(),
            is_inheritable: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    #[serde(default)]
    pub app_version: String,
}

/// Operations the pipeline needs from the note store. One implementation
/// talks ETAPI over HTTP; tests use an in-memory fake.
pub trait NoteStore {
    fn app_info(&mut self) -> Result<AppInfo>;
    fn search(&mut self, query: &str) -> Result<Vec<Note>>;
    fn get_note(&mut self, note_id: &str) -> Result<Note>;
    fn get_note_content(&mut self, note_id: &str) -> Result<String>;
    fn update_note_content(&mut self, note_id: &str, body: &str) -> Result<()>;
    fn patch_note_title(&mut self, note_id: &str, title: &str) -> Result<()>;
    fn create_attribute(&mut self, attribute: &NewAttribute) -> Result<()>;
    fn delete_note(&mut self, note_id: &str) -> Result<()>;
    fn save_revision(&mut self, note_id: &str) -> Result<()>;
    fn request_count(&self) -> usize;
}

pub fn created_since_query(days_back: u32) -> String {
    format!("note.dateCreated >= TODAY-{days_back}")
}

pub fn modified_since_query(days_back: u32) -> String {
    format!("note.dateModified >= TODAY-{days_back}")
}

/// Same exact title, created recently. TODAY-2 keeps the result set small;
/// the caller filters to the exact calendar day afterwards.
pub fn same_title_query(title: &str) -> String {
    let escaped = title.replace('"', "\\\"");
    format!("note.title = \"{escaped}\" note.dateCreated >= TODAY-2")
}

pub fn has_label_query(note_id: &str, label: &str) -> String {
    format!("note.noteId = '{note_id}' #{label}")
}

#[derive(Debug, Clone)]
pub struct EtapiClientConfig {
    pub server_url: String,
    pub token: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl EtapiClientConfig {
    pub fn from_config(config: &NoteConfig) -> Result<Self> {
        let (server_url, token) = config.require_connection()?;
        Ok(Self {
            server_url,
            token,
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
        })
    }
}

/// Blocking ETAPI client. Every operation is a single request: the pipeline's
/// failure policy is one-shot with "record and continue", so the client never
/// retries.
pub struct EtapiClient {
    client: Client,
    config: EtapiClientConfig,
    request_count: usize,
}

impl EtapiClient {
    pub fn new(config: EtapiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build ETAPI HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    pub fn from_config(config: &NoteConfig) -> Result<Self> {
        Self::new(EtapiClientConfig::from_config(config)?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/etapi/{path}", self.config.server_url)
    }

    fn send(&mut self, request: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        self.request_count += 1;
        let response = request
            .header("Authorization", self.config.token.clone())
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .context("failed to call note store")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = body.trim();
            if detail.is_empty() {
                bail!("note store request failed with HTTP {status}");
            }
            bail!("note store request failed with HTTP {status}: {detail}");
        }
        Ok(response)
    }
}

impl NoteStore for EtapiClient {
    fn app_info(&mut self) -> Result<AppInfo> {
        let response = self.send(self.client.get(self.endpoint("app-info")))?;
        response
            .json()
            .context("failed to decode app-info response")
    }

    fn search(&mut self, query: &str) -> Result<Vec<Note>> {
        let request = self
            .client
            .get(self.endpoint("notes"))
            .query(&[("search", query)]);
        let response = self.send(request)?;
        let payload: SearchResponse = response
            .json()
            .context("failed to decode note search response")?;
        Ok(payload.results)
    }

    fn get_note(&mut self, note_id: &str) -> Result<Note> {
        let response = self.send(self.client.get(self.endpoint(&format!("notes/{note_id}"))))?;
        response
            .json()
            .with_context(|| format!("failed to decode note {note_id}"))
    }

    fn get_note_content(&mut self, note_id: &str) -> Result<String> {
        let response = self.send(
            self.client
                .get(self.endpoint(&format!("notes/{note_id}/content"))),
        )?;
        response
            .text()
            .with_context(|| format!("failed to read content of note {note_id}"))
    }

    fn update_note_content(&mut self, note_id: &str, body: &str) -> Result<()> {
        let request = self
            .client
            .put(self.endpoint(&format!("notes/{note_id}/content")))
            .header("Content-Type", "text/plain")
            .body(body.to_string());
        self.send(request)?;
        Ok(())
    }

    fn patch_note_title(&mut self, note_id: &str, title: &str) -> Result<()> {
        let request = self
            .client
            .patch(self.endpoint(&format!("notes/{note_id}")))
            .json(&json!({ "title": title }));
        self.send(request)?;
        Ok(())
    }

    fn create_attribute(&mut self, attribute: &NewAttribute) -> Result<()> {
        let request = self.client.post(self.endpoint("attributes")).json(&json!({
            "noteId": attribute.note_id,
            "type": attribute.kind.as_str(),
            "name": attribute.name,
            "value": attribute.value,
            "isInheritable": attribute.is_inheritable,
        }));
        self.send(request)?;
        Ok(())
    }

    fn delete_note(&mut self, note_id: &str) -> Result<()> {
        self.send(self.client.delete(self.endpoint(&format!("notes/{note_id}"))))?;
        Ok(())
    }

    fn save_revision(&mut self, note_id: &str) -> Result<()> {
        self.send(
            self.client
                .post(self.endpoint(&format!("notes/{note_id}/revision"))),
        )?;
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Note>,
}
