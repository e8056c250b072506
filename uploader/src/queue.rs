//! The in-memory list of uploads waiting for their time.

use crate::record::{PendingUpload, QueuedUpload, UploadId, UploadJob};
use jiff::Timestamp;
use tokio::sync::Mutex;

/// Uploads scheduled for later, in the order they were submitted.
///
/// Membership only changes by appending a record or by draining the records that are due, both
/// under one lock, so a record handed out by [`UploadQueue::drain_due`] is never handed out
/// again. The queue lives as long as the process; nothing is persisted.
#[derive(Debug, Default)]
pub struct UploadQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    pending: Vec<PendingUpload>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job. Duplicates of title, time, or file are all fine.
    pub async fn enqueue(&self, job: UploadJob) -> UploadId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = UploadId(state.next_id);
        tracing::info!(
            upload_id = %id,
            title = %job.metadata.title,
            scheduled_at = %job.scheduled_at,
            "queued upload"
        );
        state.pending.push(PendingUpload::new(id, job));
        id
    }

    /// Lists what is queued, for display.
    pub async fn snapshot(&self) -> Vec<QueuedUpload> {
        let state = self.state.lock().await;
        state.pending.iter().map(PendingUpload::summary).collect()
    }

    /// Removes and returns every record scheduled at or before `now`, in queue order.
    pub async fn drain_due(&self, now: Timestamp) -> Vec<PendingUpload> {
        let mut state = self.state.lock().await;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|upload| upload.is_due(now));
        state.pending = waiting;
        due
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credentials::tests::snapshot;
    use crate::record::{UploadStatus, VideoMetadata};
    use crate::staging::{IncomingFile, StagedFile};
    use jiff::SignedDuration;
    use pretty_assertions::assert_eq;

    pub(crate) async fn job(title: &str, scheduled_at: Timestamp) -> UploadJob {
        UploadJob {
            metadata: VideoMetadata::new(title),
            source: StagedFile::stage(IncomingFile::from_bytes("clip.mp4", "video"), 1024)
                .await
                .unwrap(),
            scheduled_at,
            credentials: snapshot(),
        }
    }

    fn at(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn snapshot_lists_in_submission_order() {
        let queue = UploadQueue::new();
        let first = queue.enqueue(job("first", at("2030-01-01T12:00:00Z")).await).await;
        let second = queue.enqueue(job("second", at("2030-01-01T11:00:00Z")).await).await;
        assert_ne!(first, second);

        assert_eq!(
            queue.snapshot().await,
            vec![
                QueuedUpload {
                    id: first,
                    title: "first".to_string(),
                    scheduled_at: at("2030-01-01T12:00:00Z"),
                    status: UploadStatus::Scheduled,
                },
                QueuedUpload {
                    id: second,
                    title: "second".to_string(),
                    scheduled_at: at("2030-01-01T11:00:00Z"),
                    status: UploadStatus::Scheduled,
                },
            ]
        );
    }

    #[tokio::test]
    async fn listing_never_exposes_paths_or_tokens() {
        let queue = UploadQueue::new();
        let job = job("Demo", at("2030-01-01T12:00:00Z")).await;
        let path = job.source.path().to_string_lossy().into_owned();
        queue.enqueue(job).await;

        let listed = serde_json::to_string(&queue.snapshot().await).unwrap();
        assert!(!listed.contains(&path), "{listed}");
        assert!(!listed.contains("access-1"), "{listed}");
        assert!(!listed.contains("refresh-1"), "{listed}");
        assert!(!listed.contains("clip.mp4"), "{listed}");
    }

    #[tokio::test]
    async fn due_is_inclusive_and_order_preserving() {
        let queue = UploadQueue::new();
        let now = at("2030-01-01T12:00:00Z");
        let later = now.checked_add(SignedDuration::from_secs(1)).unwrap();
        let earlier = now.checked_sub(SignedDuration::from_mins(10)).unwrap();

        queue.enqueue(job("exactly now", now).await).await;
        queue.enqueue(job("later", later).await).await;
        queue.enqueue(job("earlier", earlier).await).await;

        let due = queue.drain_due(now).await;
        let titles: Vec<_> = due.iter().map(|u| u.metadata().title.as_str()).collect();
        assert_eq!(titles, vec!["exactly now", "earlier"]);

        let left: Vec<_> = queue.snapshot().await.into_iter().map(|u| u.title).collect();
        assert_eq!(left, vec!["later".to_string()]);
    }

    #[tokio::test]
    async fn a_record_is_drained_at_most_once() {
        let queue = UploadQueue::new();
        let now = at("2030-01-01T12:00:00Z");
        queue.enqueue(job("once", now).await).await;

        assert_eq!(queue.drain_due(now).await.len(), 1);
        assert!(queue.drain_due(now).await.is_empty());
        let much_later = now.checked_add(SignedDuration::from_hours(24)).unwrap();
        assert!(queue.drain_due(much_later).await.is_empty());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_drains_split_rather_than_duplicate() {
        let queue = std::sync::Arc::new(UploadQueue::new());
        let now = at("2030-01-01T12:00:00Z");
        for i in 0..20 {
            queue.enqueue(job(&format!("job {i}"), now).await).await;
        }

        let drains: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.drain_due(now).await })
            })
            .collect();

        let mut ids = Vec::new();
        for drain in drains {
            ids.extend(drain.await.unwrap().iter().map(PendingUpload::id));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert!(queue.is_empty().await);
    }
}
