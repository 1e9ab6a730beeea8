//! Filesystem-backed blob store
//!
//! Treats a local directory as the bucket: each file is one object, keyed by
//! its `/`-separated path relative to the root. Listing is recursive and
//! returns keys in lexicographic order, matching the natural ordering a real
//! object store would serve for time-partitioned exports.
//!
//! Objects are served as a true byte stream: a blocking worker pulls
//! fixed-size chunks through the codec's streaming decoder and hands them
//! over a small bounded channel, so a large compressed object never
//! materializes wholesale. The paced buffer stays the only memory bound.

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tracing::debug;

use super::compression::ObjectCodec;
use super::{BlobStore, ObjectHandle};
use crate::error::{Result, RestreamError};

/// Size of one decompressed chunk pulled by the blocking reader
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the blocking reader and the consumer
const CHANNEL_DEPTH: usize = 4;

/// Blob store reading objects from a local directory tree
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_key(root: &Path, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectHandle>> {
        if !self.root.is_dir() {
            return Err(RestreamError::source_access(format!(
                "bucket directory {} does not exist",
                self.root.display()
            )));
        }

        let mut handles = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                RestreamError::source_access(format!("cannot list {}: {}", dir.display(), e))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                RestreamError::source_access(format!("cannot list {}: {}", dir.display(), e))
            })? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Some(key) = Self::object_key(&self.root, &path) {
                    if key.starts_with(prefix) {
                        handles.push(ObjectHandle { key });
                    }
                }
            }
        }

        // Object stores serve listings in lexicographic key order; events are
        // consumed across objects in exactly this order.
        handles.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(
            bucket = %self.root.display(),
            prefix = %prefix,
            objects = handles.len(),
            "listed source objects"
        );

        Ok(handles)
    }

    async fn open(&self, handle: &ObjectHandle) -> Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        let path = self.root.join(&handle.key);
        let codec = ObjectCodec::from_key(&handle.key);

        let (tx, mut chunks) = mpsc::channel(CHANNEL_DEPTH);
        let read_path = path.clone();
        tokio::task::spawn_blocking(move || stream_object(read_path, codec, tx));

        // The first chunk is pulled eagerly so a missing file or corrupt
        // compression header fails the open, not a later read.
        let current = match chunks.recv().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                return Err(match e.kind() {
                    ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                        RestreamError::source_access(format!(
                            "cannot read {}: {}",
                            path.display(),
                            e
                        ))
                    }
                    _ => RestreamError::decode(format!("corrupt object {}: {}", handle.key, e)),
                });
            }
            None => Bytes::new(),
        };

        debug!(object = %handle.key, codec = codec.name(), "opened source object");
        Ok(Box::new(ObjectStream { chunks, current }))
    }
}

/// Blocking worker: pull decompressed chunks and feed them to the channel
/// until the object ends, a read fails, or the consumer hangs up.
fn stream_object(path: PathBuf, codec: ObjectCodec, tx: mpsc::Sender<std::io::Result<Bytes>>) {
    let file = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(e) => {
            let _ = tx.blocking_send(Err(e));
            return;
        }
    };

    let mut reader = match codec.reader(std::io::BufReader::new(file)) {
        Ok(reader) => reader,
        Err(e) => {
            let _ = tx.blocking_send(Err(e));
            return;
        }
    };

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    // consumer dropped the stream mid-object
                    return;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

/// Buffered async view over the chunk channel. A closed channel is
/// end-of-object.
struct ObjectStream {
    chunks: mpsc::Receiver<std::io::Result<Bytes>>,
    current: Bytes,
}

impl AsyncRead for ObjectStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let taken = {
            let chunk = ready!(self.as_mut().poll_fill_buf(cx))?;
            if chunk.is_empty() {
                return Poll::Ready(Ok(()));
            }
            let taken = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..taken]);
            taken
        };
        self.consume(taken);
        Poll::Ready(Ok(()))
    }
}

impl AsyncBufRead for ObjectStream {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<&[u8]>> {
        let this = self.get_mut();
        while this.current.is_empty() {
            match ready!(this.chunks.poll_recv(cx)) {
                Some(Ok(chunk)) => this.current = chunk,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => break,
            }
        }
        Poll::Ready(Ok(&this.current))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        self.get_mut().current.advance(amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;

    fn write_gzip(path: &Path, contents: &str) {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        std::fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefixed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("trips")).unwrap();
        std::fs::write(dir.path().join("trips/part-002.json"), "b").unwrap();
        std::fs::write(dir.path().join("trips/part-001.json"), "a").unwrap();
        std::fs::write(dir.path().join("other.json"), "c").unwrap();

        let store = FsBlobStore::new(dir.path());
        let handles = store.list("trips/").await.unwrap();
        let keys: Vec<&str> = handles.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["trips/part-001.json", "trips/part-002.json"]);

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_list_missing_bucket_is_source_access_error() {
        let store = FsBlobStore::new("/definitely/not/a/dir");
        let err = store.list("").await.unwrap_err();
        assert!(matches!(err, RestreamError::SourceAccess(_)));
    }

    #[tokio::test]
    async fn test_open_decompresses_by_suffix() {
        let dir = TempDir::new().unwrap();
        write_gzip(&dir.path().join("events.json.gz"), "one\ntwo\n");

        let store = FsBlobStore::new(dir.path());
        let handle = ObjectHandle {
            key: "events.json.gz".to_string(),
        };
        let mut reader = store.open(&handle).await.unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "one\n");
    }

    #[tokio::test]
    async fn test_open_corrupt_object_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("events.json.gz"), "not gzip at all").unwrap();

        let store = FsBlobStore::new(dir.path());
        let handle = ObjectHandle {
            key: "events.json.gz".to_string(),
        };
        assert!(store.open(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_object_is_source_access_error() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        let handle = ObjectHandle {
            key: "missing.json".to_string(),
        };
        let err = match store.open(&handle).await {
            Ok(_) => panic!("expected opening a missing object to fail"),
            Err(err) => err,
        };
        assert!(matches!(err, RestreamError::SourceAccess(_)));
    }

    #[tokio::test]
    async fn test_open_streams_large_objects_across_chunks() {
        let dir = TempDir::new().unwrap();
        // well past one chunk of decompressed data
        let line = format!(
            "{{\"ts\":\"2018-01-04T06:30:00Z\",\"pad\":\"{}\"}}\n",
            "x".repeat(80)
        );
        let contents: String = std::iter::repeat(line.as_str()).take(2000).collect();
        assert!(contents.len() > READ_CHUNK_SIZE);
        write_gzip(&dir.path().join("big.json.gz"), &contents);

        let store = FsBlobStore::new(dir.path());
        let handle = ObjectHandle {
            key: "big.json.gz".to_string(),
        };
        let mut reader = store.open(&handle).await.unwrap();

        let mut lines = 0;
        let mut buf = String::new();
        loop {
            buf.clear();
            if reader.read_line(&mut buf).await.unwrap() == 0 {
                break;
            }
            assert_eq!(buf, line);
            lines += 1;
        }
        assert_eq!(lines, 2000);
    }

    #[tokio::test]
    async fn test_empty_object_is_immediate_eof() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("empty.json"), "").unwrap();

        let store = FsBlobStore::new(dir.path());
        let handle = ObjectHandle {
            key: "empty.json".to_string(),
        };
        let mut reader = store.open(&handle).await.unwrap();
        let mut line = String::new();
        assert_eq!(reader.read_line(&mut line).await.unwrap(), 0);
    }
}
