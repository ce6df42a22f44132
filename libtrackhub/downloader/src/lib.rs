mod archive;
mod event;
mod fetcher;
mod job;
mod manager;
mod naming;
pub mod settings;

pub use archive::{
    ArchiveEntry, ArchiveError, ArchiveSink, ArchiveUrls, DirectorySink, MemorySink,
    OBJECT_URL_PREFIX, build_zip,
};
pub use event::{DownloadEvent, DownloadEventStream};
pub use fetcher::{FetchError, FetchedMedia, HttpMediaFetcher, MediaFetcher};
pub use job::*;
pub use manager::{DownloadError, DownloadManager, DownloadedFile};
pub use naming::{UNKNOWN_ERA, era_folder, extension_for, sanitize_file_name};
