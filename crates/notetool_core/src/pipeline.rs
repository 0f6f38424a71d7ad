use std::collections::BTreeSet;

use anyhow::{Context, Result};

use crate::extract::extract_key_passages;
use crate::fetcher::ContentFetcher;
use crate::merge::{CLIP_TITLE_PREFIX, merge_and_retitle};
use crate::report::{EventKind, RunReport};
use crate::store::{
    NewAttribute, Note, NoteStore, created_since_query, has_label_query, modified_since_query,
};
use crate::urls::{UrlMode, find_url};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub days_back: u32,
    pub max_notes: usize,
    /// Restrict the run to one note (routed through the modified/read path).
    pub note_id: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            days_back: 1,
            max_notes: 100,
            note_id: None,
        }
    }
}

/// One daily batch: select recent notes, snapshot revisions, merge duplicate
/// clips, enrich link notes, and condense read notes. Fatal only before
/// per-note iteration begins; everything after is record-and-continue.
pub fn run_daily<S: NoteStore + ?Sized, F: ContentFetcher + ?Sized>(
    store: &mut S,
    fetcher: &F,
    options: &RunOptions,
) -> Result<RunReport> {
    store
        .app_info()
        .context("failed to reach the note store")?;

    let mut report = RunReport::default();

    let (created, modified) = if let Some(note_id) = &options.note_id {
        let note = store
            .get_note(note_id)
            .with_context(|| format!("note {note_id} not found"))?;
        (Vec::new(), vec![note])
    } else {
        let mut created = store.search(&created_since_query(options.days_back))?;
        let mut modified = store.search(&modified_since_query(options.days_back))?;
        created.truncate(options.max_notes);
        modified.truncate(options.max_notes);
        (created, modified)
    };
    report.created_selected = created.len();
    report.modified_selected = modified.len();

    let mut link_notes = Vec::new();
    let mut other_notes = Vec::new();
    for note in created {
        if has_label(store, &note, "link", &mut report) {
            link_notes.push(note);
        } else {
            other_notes.push(note);
        }
    }

    let mut read_notes = Vec::new();
    for note in modified {
        if has_label(store, &note, "clipType", &mut report) {
            read_notes.push(note);
        }
    }

    // Revisions are snapshotted before any content rewrite, for the note
    // sets whose bodies this run may replace.
    save_revisions(store, other_notes.iter().chain(read_notes.iter()), &mut report);

    for note in &link_notes {
        if skip_unprocessable(note, &mut report) {
            continue;
        }
        let result = if note.title.trim().starts_with(CLIP_TITLE_PREFIX) {
            process_clip_note(store, fetcher, note, &mut report)
        } else {
            process_link_note(store, fetcher, note, &mut report)
        };
        if let Err(error) = result {
            report.record_error(&note.note_id, &note.title, format!("{error:#}"));
        }
    }

    for note in &read_notes {
        if skip_unprocessable(note, &mut report) {
            continue;
        }
        if let Err(error) = process_read_note(store, note, &mut report) {
            report.record_error(&note.note_id, &note.title, format!("{error:#}"));
        }
    }

    report.request_count = store.request_count();
    Ok(report)
}

fn skip_unprocessable(note: &Note, report: &mut RunReport) -> bool {
    if note.is_protected {
        report.record(&note.note_id, EventKind::Skipped, "protected note");
        return true;
    }
    if !note.kind.is_text() {
        report.record(&note.note_id, EventKind::Skipped, "not a text note");
        return true;
    }
    false
}

fn has_label<S: NoteStore + ?Sized>(
    store: &mut S,
    note: &Note,
    label: &str,
    report: &mut RunReport,
) -> bool {
    match store.search(&has_label_query(&note.note_id, label)) {
        Ok(results) => !results.is_empty(),
        Err(error) => {
            report.record_error(&note.note_id, &note.title, format!("{error:#}"));
            false
        }
    }
}

fn save_revisions<'a, S: NoteStore + ?Sized>(
    store: &mut S,
    notes: impl Iterator<Item = &'a Note>,
    report: &mut RunReport,
) {
    // A note can be selected both as created and as read; one snapshot is
    // enough.
    let mut seen = BTreeSet::new();
    for note in notes {
        if !seen.insert(note.note_id.as_str()) {
            continue;
        }
        report.revisions.total += 1;
        match store.save_revision(&note.note_id) {
            Ok(()) => {
                report.revisions.successful += 1;
                report.record(&note.note_id, EventKind::RevisionSaved, &note.title);
            }
            Err(error) => {
                report.revisions.failed += 1;
                report.record_error(
                    &note.note_id,
                    &note.title,
                    format!("failed to save revision: {error:#}"),
                );
            }
        }
    }
}

fn process_clip_note<S: NoteStore + ?Sized, F: ContentFetcher + ?Sized>(
    store: &mut S,
    fetcher: &F,
    note: &Note,
    report: &mut RunReport,
) -> Result<()> {
    let outcome = merge_and_retitle(store, fetcher, note)?;
    report.clips.processed += 1;
    if outcome.merged {
        report.clips.merged += 1;
        report.record(
            &note.note_id,
            EventKind::Merged,
            format!(
                "merged {} duplicate(s) into the oldest note",
                outcome.deleted_duplicates.len()
            ),
        );
    }
    for deleted in &outcome.deleted_duplicates {
        report.record(deleted, EventKind::DuplicateDeleted, &note.title);
    }
    for link in &outcome.duplicate_links {
        report.record(&note.note_id, EventKind::DuplicateLink, link);
    }
    if let Some(page_url) = &outcome.page_url {
        report.record(&note.note_id, EventKind::PageUrlAdded, page_url);
    }
    if outcome.title_updated {
        report.clips.titles_updated += 1;
        report.record(&note.note_id, EventKind::TitleUpdated, &note.title);
    }
    for error in outcome.errors {
        report.record_error(&note.note_id, &note.title, error);
    }
    Ok(())
}

fn process_link_note<S: NoteStore + ?Sized, F: ContentFetcher + ?Sized>(
    store: &mut S,
    fetcher: &F,
    note: &Note,
    report: &mut RunReport,
) -> Result<()> {
    let content = store.get_note_content(&note.note_id)?;
    let Some(url) = find_url(&content, UrlMode::Whole) else {
        report.record(&note.note_id, EventKind::NoMatch, "no URL in note content");
        return Ok(());
    };
    report.links.urls_found += 1;

    let Some(article) = fetcher.fetch_article(&url) else {
        report.record(
            &note.note_id,
            EventKind::NoMatch,
            format!("could not fetch {url}"),
        );
        report.links.processed += 1;
        return Ok(());
    };

    store.create_attribute(&NewAttribute::label(&note.note_id, "pageUrl", &url))?;
    if !article.authors.is_empty() {
        store.create_attribute(&NewAttribute::label(
            &note.note_id,
            "authors",
            &article.authors.join(", "),
        ))?;
    }
    if let Some(date) = &article.publish_date {
        store.create_attribute(&NewAttribute::label(&note.note_id, "date", date))?;
    }
    store.update_note_content(&note.note_id, &article.html)?;

    report.links.content_fetched += 1;
    report.links.processed += 1;
    report.record(&note.note_id, EventKind::ContentFetched, url);
    Ok(())
}

fn process_read_note<S: NoteStore + ?Sized>(
    store: &mut S,
    note: &Note,
    report: &mut RunReport,
) -> Result<()> {
    let content = store.get_note_content(&note.note_id)?;
    if content.trim().is_empty() {
        report.record(&note.note_id, EventKind::Skipped, "empty note body");
        return Ok(());
    }
    report.reads.processed += 1;

    match extract_key_passages(&content) {
        Some(condensed) => {
            store.update_note_content(&note.note_id, &condensed)?;
            report.reads.highlights_extracted += 1;
            report.record(&note.note_id, EventKind::HighlightsExtracted, &note.title);
        }
        None => {
            report.record(
                &note.note_id,
                EventKind::NoMatch,
                "no highlighted text or links found",
            );
        }
    }
    Ok(())
}
