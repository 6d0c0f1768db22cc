use std::fmt::Display;
use std::io;
use std::path::{Component, Path, PathBuf};

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use kernel::VideoFormat;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File is too large. Max size is {}MB.", .limit / MIB)]
    TooLarge { limit: u64 },

    #[error("upload stream interrupted: {0}")]
    Interrupted(String),

    #[error("'{0}' is not a bare file name")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error type of an upload byte stream.
pub trait StreamFault: Display {
    /// The stream was cut because the request body grew past the server-wide cap.
    fn exceeds_limit(&self) -> bool {
        false
    }
}

impl StreamFault for io::Error {}

/// Result of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
}

/// The flat videos directory every upload lands in.
#[derive(Debug)]
pub struct VideoStore {
    dir: PathBuf,
    max_file_size: u64,
}

impl VideoStore {
    /// Creates the directory if missing. Called once at startup.
    pub async fn open(dir: impl Into<PathBuf>, max_file_size: u64) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let dir = fs::canonicalize(&dir).await?;
        tracing::debug!("videos directory: {}", dir.display());
        Ok(Self { dir, max_file_size })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Streams `stream` into `<dir>/<file_name>` without buffering it in memory.
    ///
    /// Bytes go to a hidden `.part` file first which is renamed onto the final
    /// name once the stream ends within the size limit. On every other exit,
    /// including the returned future being dropped, the partial file is removed.
    pub async fn write<S, E>(&self, file_name: &str, stream: S) -> Result<StoredFile, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: StreamFault,
    {
        let target = self.path_for(file_name)?;
        let partial = PartialFile::new(&self.dir);

        let file = fs::File::create(partial.path()).await?;
        let mut writer = BufWriter::new(file);

        futures::pin_mut!(stream);
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.exceeds_limit() {
                    StoreError::TooLarge {
                        limit: self.max_file_size,
                    }
                } else {
                    StoreError::Interrupted(e.to_string())
                }
            })?;
            written += chunk.len() as u64;
            if written > self.max_file_size {
                tracing::warn!(
                    "file: {} exceeded limit of {} bytes, discarding",
                    file_name,
                    self.max_file_size
                );
                return Err(StoreError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            writer.write_all(&chunk).await?;
        }

        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_all().await?;
        drop(file);

        fs::rename(partial.path(), &target).await?;
        partial.keep();

        Ok(StoredFile {
            path: target,
            size: written,
        })
    }

    /// Names of the stored videos, sorted.
    pub async fn list(&self) -> io::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut videos = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if VideoFormat::from_file_name(&name).is_some() {
                videos.push(name);
            }
        }
        videos.sort();
        Ok(videos)
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(file_name).components();
        let bare = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !bare || file_name.contains(['/', '\\', '\0']) {
            return Err(StoreError::InvalidName(file_name.to_owned()));
        }
        Ok(self.dir.join(file_name))
    }
}

/// Removes the temporary file on drop unless `keep` was called.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(dir: &Path) -> Self {
        let nonce: u64 = rand::random();
        Self {
            path: dir.join(format!(".vidvault-{nonce:016x}.part")),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("partial file {} removed", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                "partial file {} not removed. Error: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use rstest::rstest;
    use std::time::Duration;
    use tempfile::TempDir;

    type Chunk = Result<Bytes, io::Error>;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Chunk> {
        let items: Vec<Chunk> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(items)
    }

    async fn store(limit: u64) -> (TempDir, VideoStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = VideoStore::open(tmp.path().join("videos"), limit)
            .await
            .unwrap();
        (tmp, store)
    }

    fn dir_entries(store: &VideoStore) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        // Arrange
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("videos");

        // Act
        let first = VideoStore::open(&dir, 10).await.unwrap();
        let second = VideoStore::open(&dir, 10).await.unwrap();

        // Assert
        assert_eq!(first.dir(), second.dir());
        assert!(first.dir().is_absolute());
    }

    #[tokio::test]
    async fn write_streams_all_chunks() {
        // Arrange
        let (_tmp, store) = store(1024).await;

        // Act
        let stored = store
            .write("clip.mp4", chunks(&[b"abc", b"defg", b""]))
            .await
            .unwrap();

        // Assert
        assert_eq!(stored.size, 7);
        assert_eq!(stored.path, store.dir().join("clip.mp4"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"abcdefg");
        assert_eq!(dir_entries(&store), vec!["clip.mp4"]);
    }

    #[tokio::test]
    async fn write_accepts_exactly_the_limit() {
        // Arrange
        let (_tmp, store) = store(4).await;

        // Act
        let stored = store.write("clip.mp4", chunks(&[b"ab", b"cd"])).await;

        // Assert
        assert_eq!(stored.unwrap().size, 4);
    }

    #[tokio::test]
    async fn write_over_limit_leaves_nothing_behind() {
        // Arrange
        let (_tmp, store) = store(4).await;

        // Act
        let result = store.write("clip.mp4", chunks(&[b"abc", b"de"])).await;

        // Assert
        assert!(matches!(result, Err(StoreError::TooLarge { limit: 4 })));
        assert!(dir_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn interrupted_stream_leaves_nothing_behind() {
        // Arrange
        let (_tmp, store) = store(1024).await;
        let items: Vec<Chunk> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer gone")),
        ];

        // Act
        let result = store.write("clip.mp4", stream::iter(items)).await;

        // Assert
        assert!(matches!(result, Err(StoreError::Interrupted(_))));
        assert!(dir_entries(&store).is_empty());
    }

    #[derive(Debug)]
    struct CappedBody;

    impl Display for CappedBody {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "length limit exceeded")
        }
    }

    impl StreamFault for CappedBody {
        fn exceeds_limit(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn capped_request_body_is_too_large() {
        // Arrange
        let (_tmp, store) = store(1024).await;
        let items: Vec<Result<Bytes, CappedBody>> =
            vec![Ok(Bytes::from_static(b"abc")), Err(CappedBody)];

        // Act
        let result = store.write("clip.mp4", stream::iter(items)).await;

        // Assert
        assert!(matches!(result, Err(StoreError::TooLarge { limit: 1024 })));
        assert!(dir_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn cancelled_write_leaves_nothing_behind() {
        // Arrange
        let (_tmp, store) = store(1024).await;
        let stalled = chunks(&[b"abc"]).chain(stream::pending());

        // Act
        let result =
            tokio::time::timeout(Duration::from_millis(50), store.write("clip.mp4", stalled))
                .await;

        // Assert
        assert!(result.is_err());
        assert!(dir_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn second_write_with_same_name_replaces_first() {
        // Arrange
        let (_tmp, store) = store(1024).await;
        store.write("clip.mp4", chunks(&[b"old"])).await.unwrap();

        // Act
        let stored = store.write("clip.mp4", chunks(&[b"newer"])).await.unwrap();

        // Assert
        assert_eq!(std::fs::read(stored.path).unwrap(), b"newer");
        assert_eq!(dir_entries(&store), vec!["clip.mp4"]);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../escape.mp4")]
    #[case("nested/clip.mp4")]
    #[case("nested\\clip.mp4")]
    #[case("/etc/clip.mp4")]
    #[trace]
    #[tokio::test]
    async fn write_refuses_names_with_directories(#[case] name: &str) {
        // Arrange
        let (_tmp, store) = store(1024).await;

        // Act
        let result = store.write(name, chunks(&[b"abc"])).await;

        // Assert
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
        assert!(dir_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        // Arrange
        let (_tmp, store) = store(1024).await;
        for name in ["b.MP4", "a.webm", "notes.txt", "c.mkv", ".vidvault-1.part"] {
            std::fs::write(store.dir().join(name), b"x").unwrap();
        }
        std::fs::create_dir(store.dir().join("folder.mp4")).unwrap();

        // Act
        let first = store.list().await.unwrap();
        let second = store.list().await.unwrap();

        // Assert
        assert_eq!(first, vec!["a.webm", "b.MP4", "c.mkv"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn list_of_removed_directory_fails() {
        // Arrange
        let (_tmp, store) = store(1024).await;
        std::fs::remove_dir(store.dir()).unwrap();

        // Act
        let result = store.list().await;

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn too_large_message_is_in_megabytes() {
        // Arrange
        let err = StoreError::TooLarge {
            limit: 500 * 1024 * 1024,
        };

        // Act
        let message = err.to_string();

        // Assert
        assert_eq!(message, "File is too large. Max size is 500MB.");
    }
}
