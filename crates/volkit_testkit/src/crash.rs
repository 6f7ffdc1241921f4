//! Fault injection for destination writes.
//!
//! [`CrashableBackend`] wraps a real backend and fails after a set number
//! of writes, optionally leaving a torn write behind. [`CrashingOpener`]
//! hands such backends to a rewrite pass through its destination opener.
//!
//! ```rust,ignore
//! use volkit_testkit::crash::CrashingOpener;
//!
//! let crash = CrashingOpener::after_writes(3);
//! let opener = crash.opener();
//! let result = RewritePass::new("compact", &options, TransformOptions::verbatim())
//!     .with_destination_opener(&*opener)
//!     .run();
//! assert!(crash.crashed());
//! ```

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use volkit_core::writer::DestinationOpener;
use volkit_storage::{FileBackend, StorageBackend, StorageError, StorageResult};

fn simulated(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated crash during {what}")))
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    writes_allowed: usize,
    writes: AtomicUsize,
    torn_writes: bool,
    fail_on_sync: bool,
    crashed: Arc<AtomicBool>,
}

impl CrashableBackend {
    /// Wraps `inner` without any failure planned.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            writes_allowed: usize::MAX,
            writes: AtomicUsize::new(0),
            torn_writes: false,
            fail_on_sync: false,
            crashed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Lets `n` writes succeed and fails every later one.
    pub fn fail_after_writes(mut self, n: usize) -> Self {
        self.writes_allowed = n;
        self
    }

    /// Writes the first half of the failing write before failing.
    pub fn torn(mut self) -> Self {
        self.torn_writes = true;
        self
    }

    /// Fails every sync.
    pub fn fail_on_sync(mut self) -> Self {
        self.fail_on_sync = true;
        self
    }

    /// Shares the crash flag with `flag`.
    pub fn report_to(mut self, flag: Arc<AtomicBool>) -> Self {
        self.crashed = flag;
        self
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> StorageResult<()> {
        let done = self.writes.fetch_add(1, Ordering::SeqCst);
        if done >= self.writes_allowed {
            self.crashed.store(true, Ordering::SeqCst);
            if self.torn_writes && data.len() > 1 {
                let _ = self.inner.write_at(&data[..data.len() / 2], offset);
            }
            return Err(simulated("write"));
        }
        self.inner.write_at(data, offset)
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_on_sync {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Builds destination openers whose backends crash.
#[derive(Clone)]
pub struct CrashingOpener {
    writes_allowed: usize,
    torn: bool,
    fail_on_sync: bool,
    crashed: Arc<AtomicBool>,
}

impl CrashingOpener {
    /// Crashes on the write after the first `n`. The super block is the
    /// first write.
    pub fn after_writes(n: usize) -> Self {
        Self {
            writes_allowed: n,
            torn: false,
            fail_on_sync: false,
            crashed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Crashes on the final sync.
    pub fn on_sync() -> Self {
        Self {
            fail_on_sync: true,
            ..Self::after_writes(usize::MAX)
        }
    }

    /// Leaves half of the failing write on disk.
    pub fn torn(mut self) -> Self {
        self.torn = true;
        self
    }

    /// Returns whether any backend built by this opener crashed.
    pub fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// An opener creating the data log exclusively on disk, wrapped in a
    /// [`CrashableBackend`].
    pub fn opener(&self) -> Box<DestinationOpener> {
        let plan = self.clone();
        Box::new(move |path: &Path| {
            let inner = FileBackend::create_new(path)?;
            let mut backend = CrashableBackend::new(Box::new(inner))
                .fail_after_writes(plan.writes_allowed)
                .report_to(Arc::clone(&plan.crashed));
            if plan.torn {
                backend = backend.torn();
            }
            if plan.fail_on_sync {
                backend = backend.fail_on_sync();
            }
            Ok(Box::new(backend) as Box<dyn StorageBackend>)
        })
    }
}
