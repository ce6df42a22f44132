use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use strum::Display;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::{JobId, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum DownloadEvent {
    JobCreated(JobId),
    ItemProgress {
        job: JobId,
        item: usize,
        progress: u8,
    },
    ItemCompleted {
        job: JobId,
        item: usize,
    },
    ItemRetrying {
        job: JobId,
        item: usize,
        retry_count: u32,
    },
    ItemFailed {
        job: JobId,
        item: usize,
        error: String,
    },
    JobFinished {
        job: JobId,
        status: JobStatus,
    },
    JobDismissed(JobId),
}

impl DownloadEvent {
    pub fn job(&self) -> JobId {
        match self {
            DownloadEvent::JobCreated(job) | DownloadEvent::JobDismissed(job) => *job,
            DownloadEvent::ItemProgress { job, .. }
            | DownloadEvent::ItemCompleted { job, .. }
            | DownloadEvent::ItemRetrying { job, .. }
            | DownloadEvent::ItemFailed { job, .. }
            | DownloadEvent::JobFinished { job, .. } => *job,
        }
    }
}

/// Download events as a stream. A slow consumer skips the events it missed rather than ending
/// the stream; job snapshots are always available from the manager.
pub struct DownloadEventStream {
    inner: BroadcastStream<DownloadEvent>,
}

impl DownloadEventStream {
    pub fn new(rx: broadcast::Receiver<DownloadEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(rx),
        }
    }
}

impl Stream for DownloadEventStream {
    type Item = DownloadEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!("download event stream lagged by {skipped} events");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
