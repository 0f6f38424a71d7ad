use anyhow::Result;

use crate::fetcher::ContentFetcher;
use crate::store::{NewAttribute, Note, NoteStore, same_title_query};
use crate::urls::{UrlMode, find_url, page_url_for};

/// Title prefix marking auto-generated web clip notes. Only notes with this
/// prefix are eligible for merging and retitling.
pub const CLIP_TITLE_PREFIX: &str = "Lien inclus";

/// Outcome of one merge-and-retitle pass over a clip note. `errors` holds the
/// non-fatal failures (a duplicate that could not be deleted); a failure that
/// aborts the candidate is returned as `Err` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: bool,
    pub title_updated: bool,
    pub page_url: Option<String>,
    /// Trailing-line URLs found in duplicate bodies before deletion. Never
    /// used to resolve the canonical page URL; surfaced for diagnostics.
    pub duplicate_links: Vec<String>,
    pub deleted_duplicates: Vec<String>,
    pub errors: Vec<String>,
}

/// Collapse all same-day notes sharing the candidate's exact title into the
/// oldest one, then re-derive the canonical page URL and title from the
/// target's current body. The retitle step always runs, merge or not.
pub fn merge_and_retitle<S: NoteStore + ?Sized, F: ContentFetcher + ?Sized>(
    store: &mut S,
    fetcher: &F,
    candidate: &Note,
) -> Result<MergeOutcome> {
    let mut outcome = MergeOutcome::default();
    let title = candidate.title.trim().to_string();
    if !title.starts_with(CLIP_TITLE_PREFIX) {
        return Ok(outcome);
    }

    let details = store.get_note(&candidate.note_id)?;
    let day = details.created_day().to_string();

    let mut group: Vec<Note> = store
        .search(&same_title_query(&title))?
        .into_iter()
        .filter(|note| note.created_day() == day)
        .collect();

    let target_id = if group.len() <= 1 {
        candidate.note_id.clone()
    } else {
        group.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        let target = group[0].clone();

        let mut merged_bodies = Vec::new();
        for duplicate in &group[1..] {
            let body = store.get_note_content(&duplicate.note_id)?;
            if let Some(link) = find_url(&body, UrlMode::TrailingLine) {
                outcome.duplicate_links.push(link);
            }
            let trimmed = body.trim();
            if !trimmed.is_empty() {
                merged_bodies.push(trimmed.to_string());
            }
            match store.delete_note(&duplicate.note_id) {
                Ok(()) => outcome.deleted_duplicates.push(duplicate.note_id.clone()),
                Err(error) => outcome.errors.push(format!(
                    "failed to delete duplicate note {}: {error}",
                    duplicate.note_id
                )),
            }
        }

        if !merged_bodies.is_empty() {
            let original = store.get_note_content(&target.note_id)?;
            let mut parts = vec![original];
            parts.extend(merged_bodies);
            store.update_note_content(&target.note_id, &parts.join("\n\n"))?;
            outcome.merged = true;
        }
        target.note_id
    };

    // Re-read the body after merging; the page URL must come from the
    // target's current state, never from stale pre-merge content.
    let current = store.get_note_content(&target_id)?;
    if let Some(page_url) = page_url_for(&current) {
        store.create_attribute(&NewAttribute::label(&target_id, "pageUrl", &page_url))?;
        if let Some(article_title) = fetcher.fetch_title(&page_url) {
            store.patch_note_title(&target_id, &article_title)?;
            outcome.title_updated = true;
        }
        outcome.page_url = Some(page_url);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{CLIP_TITLE_PREFIX, merge_and_retitle};
    use crate::store::{AttributeKind, NoteStore};
    use crate::testing::{FakeFetcher, MockStore};

    fn clip_title() -> String {
        format!("{CLIP_TITLE_PREFIX} : X")
    }

    #[test]
    fn non_clip_titles_are_untouched() {
        let mut store = MockStore::default();
        store.add_note("n1", "Ordinary note", "2024-01-05 08:00:00.000+0100", "http://x#");
        let fetcher = FakeFetcher::default();
        let note = store.get_note("n1").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");
        assert!(!outcome.merged);
        assert!(outcome.page_url.is_none());
        assert!(store.attributes.is_empty());
    }

    #[test]
    fn merges_same_day_duplicates_into_oldest() {
        let mut store = MockStore::default();
        let title = clip_title();
        store.add_note("n2", &title, "2024-01-05 12:00:00.000+0100", "B\nhttp://y");
        store.add_note("n1", &title, "2024-01-05 08:00:00.000+0100", "A\nhttp://x");
        store.add_note("n3", &title, "2024-01-05 18:00:00.000+0100", "C http://z#");
        let fetcher = FakeFetcher::default().with_title("http://z", "Resolved Title");
        let note = store.get_note("n2").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");

        assert!(outcome.merged);
        assert!(outcome.title_updated);
        assert_eq!(outcome.page_url.as_deref(), Some("http://z"));
        assert_eq!(outcome.deleted_duplicates, vec!["n2", "n3"]);
        assert_eq!(
            store.content_of("n1"),
            "A\nhttp://x\n\nB\nhttp://y\n\nC http://z#"
        );
        assert_eq!(store.deleted, vec!["n2", "n3"]);
        assert_eq!(store.attributes.len(), 1);
        assert_eq!(store.attributes[0].name, "pageUrl");
        assert_eq!(store.attributes[0].value, "http://z");
        assert_eq!(store.attributes[0].kind, AttributeKind::Label);
        assert_eq!(
            store.patched_titles,
            vec![("n1".to_string(), "Resolved Title".to_string())]
        );
    }

    #[test]
    fn duplicate_trailing_links_are_surfaced() {
        let mut store = MockStore::default();
        let title = clip_title();
        store.add_note("n1", &title, "2024-01-05 08:00:00.000+0100", "A");
        store.add_note("n2", &title, "2024-01-05 12:00:00.000+0100", "B\nhttp://y");
        let fetcher = FakeFetcher::default();
        let note = store.get_note("n1").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");
        assert_eq!(outcome.duplicate_links, vec!["http://y".to_string()]);
    }

    #[test]
    fn notes_from_other_days_are_not_merged() {
        let mut store = MockStore::default();
        let title = clip_title();
        store.add_note("n1", &title, "2024-01-05 08:00:00.000+0100", "A\nhttp://x");
        store.add_note("n2", &title, "2024-01-06 08:00:00.000+0100", "B");
        let fetcher = FakeFetcher::default();
        let note = store.get_note("n1").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");
        assert!(!outcome.merged);
        assert!(store.deleted.is_empty());
        assert_eq!(store.content_of("n1"), "A\nhttp://x");
        // Retitle path still runs on the lone same-day note.
        assert_eq!(outcome.page_url.as_deref(), Some("http://x"));
    }

    #[test]
    fn lone_clip_note_still_gets_page_url_and_title() {
        let mut store = MockStore::default();
        let title = clip_title();
        store.add_note("n1", &title, "2024-01-05 08:00:00.000+0100", "body\nhttps://solo.example");
        let fetcher = FakeFetcher::default().with_title("https://solo.example", "Solo Page");
        let note = store.get_note("n1").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");
        assert!(!outcome.merged);
        assert!(outcome.title_updated);
        assert_eq!(outcome.page_url.as_deref(), Some("https://solo.example"));
        assert_eq!(store.attributes[0].value, "https://solo.example");
        assert_eq!(
            store.patched_titles,
            vec![("n1".to_string(), "Solo Page".to_string())]
        );
    }

    #[test]
    fn title_is_kept_when_fetcher_finds_nothing() {
        let mut store = MockStore::default();
        let title = clip_title();
        store.add_note("n1", &title, "2024-01-05 08:00:00.000+0100", "https://down.example");
        let fetcher = FakeFetcher::default();
        let note = store.get_note("n1").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");
        assert!(!outcome.title_updated);
        assert_eq!(outcome.page_url.as_deref(), Some("https://down.example"));
        assert_eq!(store.attributes.len(), 1);
        assert!(store.patched_titles.is_empty());
    }

    #[test]
    fn delete_failure_is_isolated() {
        let mut store = MockStore::default();
        let title = clip_title();
        store.add_note("n1", &title, "2024-01-05 08:00:00.000+0100", "A");
        store.add_note("n2", &title, "2024-01-05 12:00:00.000+0100", "B");
        store.add_note("n3", &title, "2024-01-05 18:00:00.000+0100", "C http://z#");
        store.fail_delete.insert("n2".to_string());
        let fetcher = FakeFetcher::default();
        let note = store.get_note("n1").expect("note");

        let outcome = merge_and_retitle(&mut store, &fetcher, &note).expect("merge");

        assert!(outcome.merged);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("n2"));
        // Target still received all duplicate bodies despite the failed delete.
        assert_eq!(store.content_of("n1"), "A\n\nB\n\nC http://z#");
        assert_eq!(store.deleted, vec!["n3"]);
        assert_eq!(outcome.page_url.as_deref(), Some("http://z"));
    }
}
