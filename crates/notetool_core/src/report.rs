use serde::Serialize;

/// One entry in the ordered event stream of a batch run. The core only
/// records events; rendering belongs to the CLI.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunEvent {
    pub note_id: String,
    pub kind: EventKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Skipped,
    RevisionSaved,
    Merged,
    DuplicateDeleted,
    DuplicateLink,
    PageUrlAdded,
    TitleUpdated,
    HighlightsExtracted,
    ContentFetched,
    NoMatch,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevisionStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClipStats {
    pub processed: usize,
    pub merged: usize,
    pub titles_updated: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    pub processed: usize,
    pub urls_found: usize,
    pub content_fetched: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadStats {
    pub processed: usize,
    pub highlights_extracted: usize,
}

/// Aggregate outcome of one batch run. Partial success is the normal case:
/// per-note failures land in `errors` and never abort the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub created_selected: usize,
    pub modified_selected: usize,
    pub revisions: RevisionStats,
    pub clips: ClipStats,
    pub links: LinkStats,
    pub reads: ReadStats,
    pub errors: Vec<String>,
    pub events: Vec<RunEvent>,
    pub request_count: usize,
}

impl RunReport {
    pub fn record(&mut self, note_id: &str, kind: EventKind, message: impl Into<String>) {
        self.events.push(RunEvent {
            note_id: note_id.to_string(),
            kind,
            message: message.into(),
        });
    }

    /// Record a per-note failure, keyed by the note's title for context.
    pub fn record_error(&mut self, note_id: &str, title: &str, error: impl std::fmt::Display) {
        let message = format!("{title}: {error}");
        self.events.push(RunEvent {
            note_id: note_id.to_string(),
            kind: EventKind::Error,
            message: message.clone(),
        });
        self.errors.push(message);
    }
}
