use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tap::TapFallible;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, error, info, warn};

use crate::archive::{
    ArchiveEntry, ArchiveError, ArchiveSink, ArchiveUrls, DirectorySink, build_zip,
};
use crate::event::{DownloadEvent, DownloadEventStream};
use crate::fetcher::{FetchError, FetchedMedia, HttpMediaFetcher, MediaFetcher};
use crate::job::{
    ArchiveInfo, DownloadJob, DownloadRequest, ItemStatus, JobId, JobStatus,
};
use crate::naming::{PathAllocator, era_folder, extension_for, sanitize_file_name};
use crate::settings::{ConfigError, DownloadSettings};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("No job with id {0}")]
    UnknownJob(JobId),
    #[error("Job {0} is still downloading")]
    JobActive(JobId),
    #[error("A download job needs at least one item")]
    EmptyJob,
    #[error("The download manager has been shut down")]
    ShutDown,
    #[error("Downloads need a Tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Fetcher(#[from] FetchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A successfully downloaded item, kept so it can be saved on its own even if the job's
/// archive can't be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub stem: String,
    pub extension: &'static str,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl DownloadedFile {
    fn new(track_name: &str, url: &str, media: FetchedMedia) -> Self {
        Self {
            stem: sanitize_file_name(track_name),
            extension: extension_for(media.content_type.as_deref(), url),
            bytes: media.bytes,
            content_type: media.content_type,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, self.extension)
    }
}

struct JobEntry {
    job: DownloadJob,
    files: Vec<Option<DownloadedFile>>,
}

enum Outcome {
    Completed,
    Retry(u32),
    Failed(String),
}

enum Settled {
    Open,
    Failed,
    Assemble(Assembly),
}

impl JobEntry {
    fn record(
        &mut self,
        item_id: usize,
        url: &str,
        result: Result<FetchedMedia, FetchError>,
        max_retries: u32,
        shut_down: bool,
    ) -> Option<Outcome> {
        let item = self.job.items.get_mut(item_id)?;
        let outcome = match result {
            Ok(media) => {
                item.status = ItemStatus::Completed;
                item.progress = 100;
                self.files[item_id] = Some(DownloadedFile::new(&item.track_name, url, media));
                self.job.completed_count += 1;
                Outcome::Completed
            }
            Err(e) => {
                if item.retry_count < max_retries && !shut_down {
                    item.retry_count += 1;
                    warn!(
                        "download of {} failed, retry {} of {max_retries}: {e}",
                        item.track_name, item.retry_count
                    );
                    item.status = ItemStatus::Pending;
                    item.progress = 0;
                    Outcome::Retry(item.retry_count)
                } else {
                    error!(
                        "giving up on {} after {} attempts: {e}",
                        item.track_name,
                        item.retry_count + 1
                    );
                    item.status = ItemStatus::Failed;
                    self.job.failed_count += 1;
                    Outcome::Failed(e.to_string())
                }
            }
        };
        Some(outcome)
    }

    /// Marks an item that will never be dispatched as failed. `false` if it already finished.
    fn fail_item(&mut self, item_id: usize, error: &str) -> bool {
        let Some(item) = self.job.items.get_mut(item_id) else {
            return false;
        };
        if item.is_terminal() {
            return false;
        }
        warn!("dropping {}: {error}", item.track_name);
        item.status = ItemStatus::Failed;
        self.job.failed_count += 1;
        true
    }

    /// Once every item is terminal, decides how the job ends.
    fn settle(&mut self, shut_down: bool) -> Settled {
        if self.job.status != JobStatus::Active || !self.job.all_items_terminal() {
            return Settled::Open;
        }
        let id = self.job.id;
        if self.job.completed_count == 0 {
            error!("every item of job {id} failed");
            self.job.status = JobStatus::Failed;
            self.job.error = Some("No items could be downloaded".to_owned());
            Settled::Failed
        } else if shut_down {
            self.job.status = JobStatus::Failed;
            self.job.error = Some(DownloadError::ShutDown.to_string());
            Settled::Failed
        } else {
            Settled::Assemble(Assembly {
                job: id,
                name: self.job.name.clone(),
                entries: self.archive_entries(),
            })
        }
    }

    /// Items that completed, placed under their era folder with collision-free names.
    fn archive_entries(&self) -> Vec<ArchiveEntry> {
        let mut paths = PathAllocator::default();
        self.job
            .items
            .iter()
            .zip(&self.files)
            .filter_map(|(item, file)| {
                let file = file.as_ref()?;
                let era = item.era_name.as_deref().or(self.job.era_name.as_deref());
                Some(ArchiveEntry {
                    path: paths.allocate(&era_folder(era), &file.stem, file.extension),
                    bytes: file.bytes.clone(),
                })
            })
            .collect()
    }
}

#[derive(Default)]
struct ManagerState {
    jobs: Vec<JobEntry>,
    /// `(job, item index)` in dispatch order, shared by every job.
    queue: VecDeque<(JobId, usize)>,
    in_flight: usize,
    shut_down: bool,
}

impl ManagerState {
    fn entry(&self, id: JobId) -> Option<&JobEntry> {
        self.jobs.iter().find(|e| e.job.id == id)
    }

    fn entry_mut(&mut self, id: JobId) -> Option<&mut JobEntry> {
        self.jobs.iter_mut().find(|e| e.job.id == id)
    }
}

struct Dispatch {
    job: JobId,
    item: usize,
    url: String,
}

struct Assembly {
    job: JobId,
    name: String,
    entries: Vec<ArchiveEntry>,
}

struct Inner {
    settings: DownloadSettings,
    fetcher: Arc<dyn MediaFetcher>,
    sink: Arc<dyn ArchiveSink>,
    urls: ArchiveUrls,
    state: Mutex<ManagerState>,
    event_tx: broadcast::Sender<DownloadEvent>,
    job_finished: Notify,
    runtime: Option<Handle>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let revoked = self.urls.revoke_all();
        if revoked > 0 {
            debug!("revoked {revoked} archive urls on drop");
        }
    }
}

/// Background download queue shared by every job.
///
/// Items from all jobs go through one FIFO queue and at most `max_concurrent` of them download
/// at once. A failed item goes to the back of the queue until it runs out of attempts. Once
/// every item of a job has finished, the completed ones are zipped on a blocking thread and
/// handed to the [`ArchiveSink`].
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    pub fn new(settings: DownloadSettings) -> Result<Self, DownloadError> {
        let fetcher = HttpMediaFetcher::new(&settings)?;
        let sink = DirectorySink::new(settings.download_dir()?);
        Ok(Self::with_parts(settings, Arc::new(fetcher), Arc::new(sink)))
    }

    /// Item downloads are spawned on the runtime this is called from. Outside a runtime, the
    /// one [`start_job`](Self::start_job) is first called from is used instead.
    pub fn with_parts(
        settings: DownloadSettings,
        fetcher: Arc<dyn MediaFetcher>,
        sink: Arc<dyn ArchiveSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                settings,
                fetcher,
                sink,
                urls: ArchiveUrls::new(),
                state: Mutex::default(),
                event_tx,
                job_finished: Notify::new(),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    fn runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: DownloadEvent) {
        // no subscribers is fine
        self.inner.event_tx.send(event).unwrap_or_default();
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn events(&self) -> DownloadEventStream {
        DownloadEventStream::new(self.subscribe())
    }

    /// Queues every request as one job. URLs must already be resolved.
    ///
    /// Fails with [`DownloadError::NoRuntime`] when the manager was built outside a Tokio
    /// runtime and this isn't called from inside one either.
    pub fn start_job(
        &self,
        name: impl Into<String>,
        artist_name: impl Into<String>,
        era_name: Option<String>,
        requests: Vec<DownloadRequest>,
    ) -> Result<JobId, DownloadError> {
        if requests.is_empty() {
            return Err(DownloadError::EmptyJob);
        }
        let runtime = self.runtime().ok_or(DownloadError::NoRuntime)?;
        let job = DownloadJob::new(name.into(), artist_name.into(), era_name, requests);
        let id = job.id;
        {
            let mut state = self.state();
            if state.shut_down {
                return Err(DownloadError::ShutDown);
            }
            info!("queueing job {id} ({}) with {} items", job.name, job.items.len());
            state.queue.extend((0..job.items.len()).map(|i| (id, i)));
            let files = job.items.iter().map(|_| None).collect();
            state.jobs.push(JobEntry { job, files });
        }
        self.emit(DownloadEvent::JobCreated(id));
        self.pump_on(&runtime);
        Ok(id)
    }

    fn pump(&self) {
        match self.runtime() {
            Some(runtime) => self.pump_on(&runtime),
            None => error!("no runtime to dispatch downloads on"),
        }
    }

    /// Starts queued items until the concurrency limit is reached.
    fn pump_on(&self, runtime: &Handle) {
        let dispatches = {
            let mut state = self.state();
            let mut dispatches = vec![];
            while !state.shut_down && state.in_flight < self.inner.settings.max_concurrent {
                let Some((job, item)) = state.queue.pop_front() else {
                    break;
                };
                let url = {
                    let Some(download) = state
                        .entry_mut(job)
                        .and_then(|e| e.job.items.get_mut(item))
                    else {
                        continue;
                    };
                    download.status = ItemStatus::Downloading;
                    download.progress = 0;
                    download.playable_url.clone()
                };
                state.in_flight += 1;
                dispatches.push(Dispatch { job, item, url });
            }
            dispatches
        };

        for dispatch in dispatches {
            let manager = self.clone();
            runtime.spawn(async move { manager.run_item(dispatch).await });
        }
    }

    async fn run_item(&self, dispatch: Dispatch) {
        let Dispatch { job, item, url } = dispatch;
        debug!("downloading item {item} of job {job}");
        let manager = self.clone();
        let on_progress = move |progress: u8| manager.set_progress(job, item, progress);
        let result = self.inner.fetcher.fetch(&url, &on_progress).await;

        let assembly = self.finish_item(job, item, &url, result);
        self.pump();
        if let Some(assembly) = assembly {
            self.assemble(assembly).await;
        }
    }

    fn set_progress(&self, job: JobId, item: usize, progress: u8) {
        let changed = {
            let mut state = self.state();
            state
                .entry_mut(job)
                .and_then(|e| e.job.items.get_mut(item))
                .filter(|i| i.status == ItemStatus::Downloading && i.progress != progress)
                .map(|i| i.progress = progress)
                .is_some()
        };
        if changed {
            self.emit(DownloadEvent::ItemProgress {
                job,
                item,
                progress,
            });
        }
    }

    /// Releases the item's concurrency slot and applies the retry policy. Returns the archive
    /// work to do if this was the job's last outstanding item.
    fn finish_item(
        &self,
        job: JobId,
        item: usize,
        url: &str,
        result: Result<FetchedMedia, FetchError>,
    ) -> Option<Assembly> {
        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        let shut_down = state.shut_down;

        let Some(entry) = state.entry_mut(job) else {
            warn!("finished item {item} for unknown job {job}");
            return None;
        };
        let outcome = entry.record(
            item,
            url,
            result,
            self.inner.settings.max_retry_attempts,
            shut_down,
        )?;
        let (assembly, job_failed) = match entry.settle(shut_down) {
            Settled::Open => (None, false),
            Settled::Failed => (None, true),
            Settled::Assemble(assembly) => (Some(assembly), false),
        };

        if let Outcome::Retry(_) = outcome {
            state.queue.push_back((job, item));
        }
        drop(state);

        self.emit(match outcome {
            Outcome::Completed => DownloadEvent::ItemCompleted { job, item },
            Outcome::Retry(retry_count) => DownloadEvent::ItemRetrying {
                job,
                item,
                retry_count,
            },
            Outcome::Failed(error) => DownloadEvent::ItemFailed { job, item, error },
        });
        if job_failed {
            self.job_finished(job, JobStatus::Failed);
        }
        assembly
    }

    async fn assemble(&self, assembly: Assembly) {
        let Assembly { job, name, entries } = assembly;
        let limit = self.inner.settings.max_zip_bytes;
        let sink = self.inner.sink.clone();
        let file_count = entries.len();
        info!("building archive for job {job} with {file_count} files");

        let result = tokio::task::spawn_blocking(move || {
            let archive = build_zip(&entries, limit)?;
            let path = sink.save(&name, &archive)?;
            Ok::<_, ArchiveError>((archive, path))
        })
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))
        .and_then(|res| res)
        .tap_err(|e| error!("archive for job {job} failed: {e}"));

        let status = {
            let mut state = self.state();
            let shut_down = state.shut_down;
            let Some(entry) = state.entry_mut(job) else {
                return;
            };
            match result {
                Ok((archive, path)) if !shut_down => {
                    let size = archive.len() as u64;
                    let object_url = self.inner.urls.create(Bytes::from(archive));
                    entry.job.archive = Some(ArchiveInfo {
                        object_url,
                        path,
                        size,
                        file_count,
                    });
                    entry.job.status = JobStatus::Completed;
                }
                Ok(_) => {
                    entry.job.status = JobStatus::Failed;
                    entry.job.error = Some(DownloadError::ShutDown.to_string());
                }
                Err(e) => {
                    entry.job.status = JobStatus::Failed;
                    entry.job.error = Some(e.to_string());
                }
            }
            entry.job.status
        };
        self.job_finished(job, status);
    }

    fn job_finished(&self, job: JobId, status: JobStatus) {
        info!("job {job} finished: {status}");
        self.emit(DownloadEvent::JobFinished { job, status });
        self.inner.job_finished.notify_waiters();
    }

    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.state().jobs.iter().map(|e| e.job.clone()).collect()
    }

    pub fn job(&self, id: JobId) -> Option<DownloadJob> {
        self.state().entry(id).map(|e| e.job.clone())
    }

    /// Waits until the job completes or fails. `None` if there is no such job.
    pub async fn wait_for_job(&self, id: JobId) -> Option<DownloadJob> {
        loop {
            let notified = self.inner.job_finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.job(id) {
                Some(job) if !job.is_terminal() => {}
                finished => return finished,
            }
            notified.await;
        }
    }

    /// A completed item's file, available whether or not the archive was built.
    pub fn item_file(&self, job: JobId, item: usize) -> Option<DownloadedFile> {
        self.state()
            .entry(job)
            .and_then(|e| e.files.get(item).cloned().flatten())
    }

    /// The archive bytes behind an object URL, until it is revoked.
    pub fn archive(&self, object_url: &str) -> Option<Bytes> {
        self.inner.urls.get(object_url)
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    fn release(&self, job: &DownloadJob) {
        if let Some(archive) = &job.archive
            && self.inner.urls.revoke(&archive.object_url)
        {
            debug!("revoked {}", archive.object_url);
        }
        self.emit(DownloadEvent::JobDismissed(job.id));
    }

    /// Removes a finished job and revokes its archive URL. Active jobs can't be dismissed.
    pub fn dismiss_job(&self, id: JobId) -> Result<DownloadJob, DownloadError> {
        let job = {
            let mut state = self.state();
            let index = state
                .jobs
                .iter()
                .position(|e| e.job.id == id)
                .ok_or(DownloadError::UnknownJob(id))?;
            if !state.jobs[index].job.is_terminal() {
                return Err(DownloadError::JobActive(id));
            }
            state.jobs.remove(index).job
        };
        self.release(&job);
        Ok(job)
    }

    /// Dismisses every finished job. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let finished: Vec<DownloadJob> = {
            let mut state = self.state();
            let (finished, active): (Vec<_>, Vec<_>) = std::mem::take(&mut state.jobs)
                .into_iter()
                .partition(|e| e.job.is_terminal());
            state.jobs = active;
            finished.into_iter().map(|e| e.job).collect()
        };
        for job in &finished {
            self.release(job);
        }
        finished.len()
    }

    /// Stops dispatching, fails every queued item and revokes every archive URL. Jobs with
    /// nothing left in flight finish as failed right away, the rest once their in-flight items
    /// return.
    pub fn shutdown(&self) {
        let error = DownloadError::ShutDown.to_string();
        let (dropped, finished) = {
            let mut state = self.state();
            state.shut_down = true;
            let queued: Vec<_> = state.queue.drain(..).collect();
            let dropped: Vec<_> = queued
                .into_iter()
                .filter(|&(job, item)| {
                    state
                        .entry_mut(job)
                        .is_some_and(|e| e.fail_item(item, &error))
                })
                .collect();
            let finished: Vec<JobId> = state
                .jobs
                .iter_mut()
                .filter_map(|e| matches!(e.settle(true), Settled::Failed).then_some(e.job.id))
                .collect();
            (dropped, finished)
        };

        for &(job, item) in &dropped {
            self.emit(DownloadEvent::ItemFailed {
                job,
                item,
                error: error.clone(),
            });
        }
        for job in finished {
            self.job_finished(job, JobStatus::Failed);
        }
        let revoked = self.inner.urls.revoke_all();
        info!(
            "download manager shut down, dropped {} queued items, revoked {revoked} urls",
            dropped.len()
        );
    }
}

#[cfg(test)]
#[path = "./manager_test.rs"]
mod manager_test;
