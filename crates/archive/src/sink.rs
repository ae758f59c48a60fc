//! Append-only containers that archive entries are written into.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::io::{Seek, Write};
use std::sync::Arc;
use tokio::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// An append-only container of named entries.
///
/// Entries may arrive in any order, but all of them before
/// [`finish`](Self::finish). Implementations are synchronous; the assembler
/// calls them from the blocking thread pool, one call at a time.
pub trait OutputSink: Send {
    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()>;

    /// Finalize the container. Nothing may be written afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// [`OutputSink`] producing a ZIP archive.
///
/// Images are stored as-is (they're already compressed); everything else is
/// deflated.
pub struct ZipSink<W: Write + Seek> {
    writer: Option<ZipWriter<W>>,
    finished: Option<W>,
}

impl<W: Write + Seek> ZipSink<W> {
    pub fn new(inner: W) -> Self {
        Self { writer: Some(ZipWriter::new(inner)), finished: None }
    }

    /// The underlying writer, once the archive has been finalized.
    pub fn into_inner(self) -> Option<W> {
        self.finished
    }

    fn options_for(name: &str) -> SimpleFileOptions {
        let stored = [".png", ".jpg", ".jpeg", ".gif", ".webp"].iter().any(|ext| name.ends_with(ext));
        let method = if stored { CompressionMethod::Stored } else { CompressionMethod::Deflated };
        SimpleFileOptions::default().compression_method(method).large_file(false)
    }
}

impl<W: Write + Seek + Send> OutputSink for ZipSink<W> {
    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_raise(|| ErrorKind::Finished)?;
        writer.start_file(name, Self::options_for(name)).or_raise(|| ErrorKind::Write(name.to_string()))?;
        writer.write_all(data).or_raise(|| ErrorKind::Write(name.to_string()))
    }

    fn finish(&mut self) -> Result<()> {
        let writer = self.writer.take().ok_or_raise(|| ErrorKind::Finished)?;
        self.finished = Some(writer.finish().or_raise(|| ErrorKind::Finish)?);
        Ok(())
    }
}

/// The single write point shared by everything that produces entries for one
/// archive. Calls are serialized by the lock and run on the blocking pool.
pub(crate) struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
}

impl<S: OutputSink + 'static> SharedSink<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self { inner: Arc::new(Mutex::new(sink)) }
    }

    pub(crate) async fn write(&self, name: String, data: impl AsRef<[u8]> + Send + 'static) -> Result<()> {
        let sink = self.inner.clone();
        tracing::debug!(entry = %name, bytes = data.as_ref().len(), "Writing archive entry");
        tokio::task::spawn_blocking(move || sink.blocking_lock().write_entry(&name, data.as_ref()))
            .await
            .or_raise(|| ErrorKind::Task)?
    }

    pub(crate) async fn finish(&self) -> Result<()> {
        let sink = self.inner.clone();
        tokio::task::spawn_blocking(move || sink.blocking_lock().finish()).await.or_raise(|| ErrorKind::Task)?
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::memory::MemorySink;

#[cfg(any(test, feature = "mock"))]
mod memory {
    use super::OutputSink;
    use crate::error::{ErrorKind, Result};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    #[derive(Default)]
    struct Contents {
        entries: Vec<(String, Vec<u8>)>,
        finished: bool,
    }

    /// In-memory [`OutputSink`] for testing.
    ///
    /// Clones share the same contents, so a test can hand one clone to the
    /// assembler and inspect another afterwards.
    #[derive(Clone, Default)]
    pub struct MemorySink {
        contents: Arc<Mutex<Contents>>,
        fail_on: Option<String>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail any write of the entry called `name`.
        pub fn failing_on(mut self, name: impl Into<String>) -> Self {
            self.fail_on = Some(name.into());
            self
        }

        /// Entry names in write order.
        pub fn names(&self) -> Vec<String> {
            self.contents().entries.iter().map(|(name, _)| name.clone()).collect()
        }

        pub fn entry(&self, name: &str) -> Option<Vec<u8>> {
            self.contents().entries.iter().find(|(entry, _)| entry == name).map(|(_, data)| data.clone())
        }

        pub fn is_finished(&self) -> bool {
            self.contents().finished
        }

        fn contents(&self) -> MutexGuard<'_, Contents> {
            self.contents.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl OutputSink for MemorySink {
        fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
            let mut contents = self.contents();
            if contents.finished {
                exn::bail!(ErrorKind::Finished);
            }
            if self.fail_on.as_deref() == Some(name) {
                exn::bail!(ErrorKind::Write(name.to_string()));
            }
            contents.entries.push((name.to_string(), data.to_vec()));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            let mut contents = self.contents();
            if contents.finished {
                exn::bail!(ErrorKind::Finished);
            }
            contents.finished = true;
            Ok(())
        }
    }
}
