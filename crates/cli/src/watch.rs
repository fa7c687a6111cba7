use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tutor_dispatch::Dispatcher;
use tutor_extract::{
    ExtractionMark, MessageScanner, PageNode, ScanReason, ScanScheduler, ScanTriggerConfig,
    SnapshotDocument, SnapshotHandle,
};
use tutor_protocol::{now_unix_ms, PendingMessage};

/// Mark store that survives file re-reads.
///
/// Node ids are only stable within one parsed document, so directory
/// re-scans identify an element by a digest of its file, tag, classes, and
/// trimmed text instead. An unchanged element in a rewritten snapshot keeps
/// its digest and is enqueued exactly once; an element whose text changed
/// counts as new.
#[derive(Debug, Default)]
pub struct SnapshotFingerprints {
    seen: HashSet<[u8; 32]>,
}

impl SnapshotFingerprints {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark view scoped to one snapshot file.
    #[must_use]
    pub fn for_file<'a>(&'a mut self, file: &'a str) -> FileMarks<'a> {
        FileMarks { file, set: self }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

pub struct FileMarks<'a> {
    file: &'a str,
    set: &'a mut SnapshotFingerprints,
}

fn fingerprint(file: &str, node: &SnapshotHandle) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(file.as_bytes());
    hasher.update([0]);
    hasher.update(node.tag().as_bytes());
    hasher.update([0]);
    for class in node.classes() {
        hasher.update(class.as_bytes());
        hasher.update([0]);
    }
    hasher.update([0]);
    hasher.update(node.text().trim().as_bytes());
    hasher.finalize().into()
}

impl ExtractionMark<SnapshotHandle> for FileMarks<'_> {
    fn is_marked(&self, node: &SnapshotHandle) -> bool {
        self.set.seen.contains(&fingerprint(self.file, node))
    }

    fn mark(&mut self, node: &SnapshotHandle) {
        self.set.seen.insert(fingerprint(self.file, node));
    }
}

/// Watches a directory of `*.json` page snapshots and feeds captured
/// messages into the dispatcher.
///
/// Filesystem events only nudge the [`ScanScheduler`]; actual scans run on
/// its debounced ticks, so a burst of snapshot rewrites costs one scan.
pub struct SnapshotWatcher {
    dir: PathBuf,
    scanner: MessageScanner,
    dispatcher: Dispatcher,
    fingerprints: SnapshotFingerprints,
}

impl SnapshotWatcher {
    #[must_use]
    pub fn new(dir: PathBuf, scanner: MessageScanner, dispatcher: Dispatcher) -> Self {
        Self {
            dir,
            scanner,
            dispatcher,
            fingerprints: SnapshotFingerprints::new(),
        }
    }

    /// Run until the dispatcher goes away. Per-file problems are logged and
    /// skipped; only a dead dispatcher or an unwatchable directory is fatal.
    pub async fn run(mut self, trigger: ScanTriggerConfig) -> Result<()> {
        let (scheduler, mut ticks) = ScanScheduler::start(trigger);
        let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(1024);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )
        .context("Failed to initialize the snapshot watcher")?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.dir.display()))?;
        log::info!("watching snapshots in {}", self.dir.display());

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(Ok(event)) if is_content_event(&event) => {
                            scheduler
                                .notify_change()
                                .await
                                .context("Scan scheduler stopped")?;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => log::warn!("snapshot watch error: {err}"),
                        None => break,
                    }
                }
                tick = ticks.recv() => {
                    let Some(reason) = tick else {
                        break;
                    };
                    self.scan_all(reason).await?;
                }
            }
        }
        Ok(())
    }

    async fn scan_all(&mut self, reason: ScanReason) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        let mut captured = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            captured += self.scan_file(&path).await?;
        }
        if captured > 0 {
            log::info!("{reason:?} scan queued {captured} message(s)");
        }
        Ok(captured)
    }

    async fn scan_file(&mut self, path: &Path) -> Result<usize> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("failed to read {}: {err}", path.display());
                return Ok(0);
            }
        };
        let doc = match SnapshotDocument::from_json(&raw) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("skipping malformed snapshot {}: {err}", path.display());
                return Ok(0);
            }
        };

        let key = path.to_string_lossy().into_owned();
        let found = {
            let mut marks = self.fingerprints.for_file(&key);
            self.scanner.scan(&doc, &mut marks)
        };
        let count = found.len();
        let origin_url = format!("file://{}", path.display());
        for message in found {
            self.dispatcher
                .enqueue(PendingMessage {
                    sender_name: message.sender_name,
                    body_text: message.body_text,
                    captured_at: now_unix_ms(),
                    origin_url: origin_url.clone(),
                })
                .await
                .context("Dispatcher stopped while queueing scanned messages")?;
        }
        Ok(count)
    }
}

fn is_content_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tutor_extract::{PageDocument, Selector};

    const SNAPSHOT: &str = r#"{
        "tag": "main",
        "children": [
            {
                "tag": "article",
                "children": [
                    {"tag": "span", "classes": ["user-name"], "text": "Amina Khan"},
                    {"tag": "p", "classes": ["forum-post"],
                     "text": "I have a question about assignment 3"}
                ]
            }
        ]
    }"#;

    fn post(doc: &SnapshotDocument) -> SnapshotHandle {
        doc.select(&Selector::Class("forum-post".to_string()))
            .into_iter()
            .next()
            .expect("snapshot has a post")
    }

    #[test]
    fn fingerprints_are_stable_across_reparses() {
        let first = SnapshotDocument::from_json(SNAPSHOT).expect("valid snapshot");
        let second = SnapshotDocument::from_json(SNAPSHOT).expect("valid snapshot");
        assert_eq!(
            fingerprint("a.json", &post(&first)),
            fingerprint("a.json", &post(&second))
        );
    }

    #[test]
    fn fingerprints_are_scoped_to_the_file() {
        let doc = SnapshotDocument::from_json(SNAPSHOT).expect("valid snapshot");
        let node = post(&doc);
        assert_ne!(fingerprint("a.json", &node), fingerprint("b.json", &node));
    }

    #[test]
    fn changed_text_changes_the_fingerprint() {
        let doc = SnapshotDocument::from_json(SNAPSHOT).expect("valid snapshot");
        let edited = SnapshotDocument::from_json(&SNAPSHOT.replace("assignment 3", "assignment 4"))
            .expect("valid snapshot");
        assert_ne!(
            fingerprint("a.json", &post(&doc)),
            fingerprint("a.json", &post(&edited))
        );
    }

    #[test]
    fn marks_suppress_re_enqueue_across_file_re_reads() {
        let scanner = MessageScanner::with_defaults();
        let mut fingerprints = SnapshotFingerprints::new();

        let first = SnapshotDocument::from_json(SNAPSHOT).expect("valid snapshot");
        let found = {
            let mut marks = fingerprints.for_file("a.json");
            scanner.scan(&first, &mut marks)
        };
        assert_eq!(found.len(), 1);

        // Re-reading the unchanged file parses a fresh document, but the
        // content digest is already marked.
        let second = SnapshotDocument::from_json(SNAPSHOT).expect("valid snapshot");
        let found = {
            let mut marks = fingerprints.for_file("a.json");
            scanner.scan(&second, &mut marks)
        };
        assert_eq!(found, Vec::new());
    }

    #[test]
    fn access_events_do_not_count_as_content_changes() {
        use notify::event::{AccessKind, CreateKind};
        assert!(is_content_event(&Event::new(EventKind::Create(
            CreateKind::File
        ))));
        assert!(!is_content_event(&Event::new(EventKind::Access(
            AccessKind::Any
        ))));
    }
}
