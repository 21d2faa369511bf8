//! A file-based mutual exclusion mechanism.
//!
//! Some slave backends need exclusive access to a file path, typically a
//! cache directory shared between processes. [`FileLock`] provides this by
//! combining two layers: an OS advisory lock on the file for cross-process
//! exclusion, and an in-process shared/exclusive counter associated with
//! the canonical path for exclusion between threads of the same process.
//! Two paths that refer to the same file resolve to the same in-process
//! entry.
//!
//! A `FileLock` object is meant to be used from one thread. Once a thread
//! holds a lock on a file, it must not try to lock the same file through a
//! different `FileLock` object; the two objects share the per-file entry,
//! so the second attempt would deadlock against the first.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use fs2::FileExt;
use lockstep_types::{Error, Result};
use parking_lot::{Condvar, Mutex};

/// In-process state for one lock file. `share_count` is 0 when free, -1
/// when exclusively held, and the number of holders when shared.
struct FileMutex {
    share_count: Mutex<i32>,
    released: Condvar,
    file: std::fs::File,
}

static REGISTRY: Mutex<BTreeMap<PathBuf, Weak<FileMutex>>> = Mutex::new(BTreeMap::new());

fn file_mutex_for(path: &Path) -> Result<Arc<FileMutex>> {
    // The file must exist before it can be locked; create it if necessary.
    // The contents are never touched.
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    let canonical = path.canonicalize()?;

    let mut registry = REGISTRY.lock();
    registry.retain(|_, weak| weak.strong_count() > 0);
    if let Some(existing) = registry.get(&canonical).and_then(Weak::upgrade) {
        return Ok(existing);
    }
    let entry = Arc::new(FileMutex {
        share_count: Mutex::new(0),
        released: Condvar::new(),
        file,
    });
    registry.insert(canonical, Arc::downgrade(&entry));
    Ok(entry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    None,
    Shared,
    Exclusive,
}

/// A named mutual-exclusion primitive keyed by canonical filesystem path,
/// combined with an OS advisory file lock. The lock is released when the
/// object is dropped.
pub struct FileLock {
    entry: Arc<FileMutex>,
    held: Held,
}

impl FileLock {
    /// Creates a lock object for the file at `path`, without acquiring the
    /// lock. The file is created if it does not exist; if it exists, the
    /// process must have write permission to it.
    pub fn new(path: impl AsRef<Path>) -> Result<FileLock> {
        Ok(FileLock {
            entry: file_mutex_for(path.as_ref())?,
            held: Held::None,
        })
    }

    fn check_not_held(&self) -> Result<()> {
        if self.held != Held::None {
            return Err(Error::logic("this file lock is already held"));
        }
        Ok(())
    }

    /// Acquires an exclusive lock, blocking until both the in-process entry
    /// and the file lock are available.
    pub fn lock(&mut self) -> Result<()> {
        self.check_not_held()?;
        {
            let mut count = self.entry.share_count.lock();
            while *count != 0 {
                self.entry.released.wait(&mut count);
            }
            *count = -1;
        }
        // This thread now has exclusive in-process ownership of the entry,
        // so no other thread touches the file descriptor while we block on
        // the OS lock.
        if let Err(e) = self.entry.file.lock_exclusive() {
            let mut count = self.entry.share_count.lock();
            *count = 0;
            self.entry.released.notify_all();
            return Err(e.into());
        }
        self.held = Held::Exclusive;
        Ok(())
    }

    /// Attempts to acquire an exclusive lock without blocking. Returns
    /// whether the attempt succeeded.
    pub fn try_lock(&mut self) -> Result<bool> {
        self.check_not_held()?;
        let mut count = self.entry.share_count.lock();
        if *count != 0 {
            return Ok(false);
        }
        match self.entry.file.try_lock_exclusive() {
            Ok(()) => {
                *count = -1;
                drop(count);
                self.held = Held::Exclusive;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Acquires a shared lock, blocking if necessary.
    ///
    /// The OS lock is only taken by the first shared holder in the process
    /// and released by the last, so the entry keeps a share count.
    pub fn lock_shared(&mut self) -> Result<()> {
        self.check_not_held()?;
        let mut count = self.entry.share_count.lock();
        while *count < 0 {
            self.entry.released.wait(&mut count);
        }
        if *count == 0 {
            if let Err(e) = self.entry.file.lock_shared() {
                return Err(e.into());
            }
        }
        *count += 1;
        drop(count);
        self.held = Held::Shared;
        Ok(())
    }

    /// Attempts to acquire a shared lock without blocking. Returns whether
    /// the attempt succeeded.
    pub fn try_lock_shared(&mut self) -> Result<bool> {
        self.check_not_held()?;
        let mut count = self.entry.share_count.lock();
        if *count < 0 {
            return Ok(false);
        }
        if *count == 0 && self.entry.file.try_lock_shared().is_err() {
            return Ok(false);
        }
        *count += 1;
        drop(count);
        self.held = Held::Shared;
        Ok(true)
    }

    /// Releases the lock.
    pub fn unlock(&mut self) {
        match self.held {
            Held::None => return,
            Held::Exclusive => {
                let _ = FileExt::unlock(&self.entry.file);
                let mut count = self.entry.share_count.lock();
                *count = 0;
                self.entry.released.notify_all();
            }
            Held::Shared => {
                let mut count = self.entry.share_count.lock();
                *count -= 1;
                if *count == 0 {
                    let _ = FileExt::unlock(&self.entry.file);
                    self.entry.released.notify_all();
                }
            }
        }
        self.held = Held::None;
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.lock");
        let mut lock = FileLock::new(&path).unwrap();
        lock.lock().unwrap();
        assert!(lock.lock().is_err());
        lock.unlock();
        lock.lock_shared().unwrap();
        lock.unlock();
        lock.lock().unwrap();
    }

    #[test]
    fn test_same_file_shares_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.lock");
        let mut a = FileLock::new(&path).unwrap();
        let mut b = FileLock::new(&path).unwrap();
        a.lock().unwrap();
        assert!(!b.try_lock().unwrap());
        assert!(!b.try_lock_shared().unwrap());
        a.unlock();
        assert!(b.try_lock().unwrap());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.lock");
        let mut a = FileLock::new(&path).unwrap();
        let mut b = FileLock::new(&path).unwrap();
        a.lock_shared().unwrap();
        assert!(b.try_lock_shared().unwrap());
        assert!(!FileLock::new(&path).unwrap().try_lock().unwrap());
        a.unlock();
        b.unlock();
    }

    #[test]
    fn test_blocking_handoff_between_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.lock");
        let mut held = FileLock::new(&path).unwrap();
        held.lock().unwrap();

        let path_clone = path.clone();
        let waiter = std::thread::spawn(move || {
            let mut lock = FileLock::new(&path_clone).unwrap();
            lock.lock().unwrap();
            lock.unlock();
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        held.unlock();
        waiter.join().unwrap();
    }
}
