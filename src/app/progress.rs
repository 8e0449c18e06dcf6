//! Progress UI (spinner) for sync runs, fed by engine events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use zotsync_core::{SyncEvent, SyncPhase};

/// Spinner message for an event; `None` leaves the message unchanged.
pub(crate) fn event_message(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::LibraryStarted {
            library,
            position,
            total,
        } => Some(format!("[{position}/{total}] Syncing {}...", library.name)),
        SyncEvent::PhaseCompleted {
            library,
            phase,
            count,
        } => Some(match phase {
            SyncPhase::CollectionsReconciled => format!("{library}: {count} collections"),
            SyncPhase::ItemsSelected => format!("{library}: {count} items selected"),
            SyncPhase::ChildrenFetched => format!("{library}: fetched children of {count} items"),
            SyncPhase::AttachmentsDownloaded => format!("{library}: downloaded {count} PDFs"),
            SyncPhase::DocumentsIngested => format!("{library}: stored {count} documents"),
            other => format!("{library}: {other}"),
        }),
        SyncEvent::LibraryFailed { library, reason } => Some(format!("{library}: {reason}")),
        SyncEvent::CleanupStarted { candidates } => {
            Some(format!("Checking {candidates} new collections for content..."))
        }
        SyncEvent::Finished(_) | SyncEvent::Aborted { .. } => None,
    }
}

/// Drains `events` until the sender side closes.
///
/// With `use_spinner` false the events are consumed silently.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    mut events: UnboundedReceiver<SyncEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = use_spinner.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message("Connecting...");
            spinner
        });

        while let Some(event) = events.recv().await {
            if let Some(spinner) = &spinner
                && let Some(message) = event_message(&event)
            {
                spinner.set_message(message);
            }
        }

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zotsync_core::{Library, LibraryId, SyncStats};

    #[test]
    fn test_event_messages() {
        let started = SyncEvent::LibraryStarted {
            library: Library::group(5, "Lab"),
            position: 2,
            total: 3,
        };
        assert_eq!(event_message(&started).as_deref(), Some("[2/3] Syncing Lab..."));

        let phase = SyncEvent::PhaseCompleted {
            library: LibraryId::Personal,
            phase: SyncPhase::DocumentsIngested,
            count: 4,
        };
        assert_eq!(
            event_message(&phase).as_deref(),
            Some("personal: stored 4 documents")
        );
        assert!(event_message(&SyncEvent::Finished(SyncStats::default())).is_none());
    }

    #[tokio::test]
    async fn test_progress_task_ends_when_sender_dropped() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_progress_ui(false, rx);
        tx.send(SyncEvent::CleanupStarted { candidates: 1 }).unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
