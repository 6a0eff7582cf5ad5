//! Shared memory between the graph process and its workers.
//!
//! Two pieces live here. The [`ControlRegion`] holds the transport's `stop`
//! and `shutdown` flags as atomics in a shared file-backed mapping created
//! before the worker is forked, so both processes observe the same bytes.
//! The [`ShmRegistry`] owns the named segments registered with
//! `IsolateBuilder::to_shm`: each is a file under `/dev/shm` (or the temp
//! directory where that does not exist), mapped into both processes and
//! unlinked when the owning registry is released.
//!
//! Segment contents are advisory: the engine transports the bytes but does
//! not synchronize access to them.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use memmap2::MmapMut;
use tracing::debug;

use crate::error::RillError;

const CTRL_LEN: usize = 2;
const STOP: usize = 0;
const SHUTDOWN: usize = 1;

/// Directory for shared mappings: `/dev/shm` when available.
fn shm_dir() -> PathBuf {
    let dev_shm = PathBuf::from("/dev/shm");
    if dev_shm.is_dir() {
        dev_shm
    } else {
        std::env::temp_dir()
    }
}

fn create_mapping(path: &Path, len: usize) -> Result<(std::fs::File, MmapMut), RillError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| RillError::ShmError(format!("create {}: {e}", path.display())))?;
    file.set_len(len as u64)
        .map_err(|e| RillError::ShmError(format!("size {}: {e}", path.display())))?;
    // SAFETY: the file was created exclusively by this call and is sized
    // above; nothing else truncates it while the mapping lives.
    let map = unsafe { MmapMut::map_mut(&file) }
        .map_err(|e| RillError::ShmError(format!("map {}: {e}", path.display())))?;
    Ok((file, map))
}

/// The `stop`/`shutdown` flag pair shared with one worker process.
///
/// Created before the fork; the backing file is unlinked immediately after
/// mapping, so the region disappears with the last process that unmaps it.
pub struct ControlRegion {
    map: MmapMut,
}

impl ControlRegion {
    pub(crate) fn create(tag: &str) -> Result<Self, RillError> {
        let path = shm_dir().join(format!("rill-{tag}-ctl"));
        let (_file, map) = create_mapping(&path, CTRL_LEN)?;
        // The mapping keeps the memory alive; the name is not needed again.
        let _ = fs::remove_file(&path);
        Ok(ControlRegion { map })
    }

    fn flag(&self, offset: usize) -> &AtomicU8 {
        debug_assert!(offset < CTRL_LEN);
        // SAFETY: the mapping is CTRL_LEN bytes, lives as long as self, and
        // AtomicU8 is one byte with no alignment requirement beyond 1.
        unsafe { &*self.map.as_ptr().add(offset).cast::<AtomicU8>() }
    }

    /// Request the worker to cease work at its next wait.
    pub fn set_stop(&self) {
        self.flag(STOP).store(1, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag(STOP).load(Ordering::SeqCst) != 0
    }

    /// Mark the graph as terminating (error or explicit shutdown).
    ///
    /// Combined with `stop`, tells the worker to drain its input queue
    /// before exiting.
    pub fn set_shutdown(&self) {
        self.flag(SHUTDOWN).store(1, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.flag(SHUTDOWN).load(Ordering::SeqCst) != 0
    }
}

/// One named shared-memory segment.
pub struct ShmSegment {
    name: String,
    path: PathBuf,
    map: MmapMut,
}

impl ShmSegment {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystem path of the backing file while the registry owns it.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

/// Scoped collection of named segments for one transport instance.
///
/// The registry that owns the segments unlinks every backing file when it is
/// released (or dropped), regardless of exit path. The worker-side copy is
/// disowned after the fork so only the graph process cleans up.
pub struct ShmRegistry {
    tag: String,
    segments: Vec<ShmSegment>,
    owner: bool,
}

impl ShmRegistry {
    pub(crate) fn new(tag: &str) -> Self {
        ShmRegistry {
            tag: tag.to_string(),
            segments: Vec::new(),
            owner: true,
        }
    }

    /// Create a named segment initialized with `bytes`.
    pub(crate) fn register(&mut self, name: &str, bytes: &[u8]) -> Result<(), RillError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(RillError::ShmError(format!(
                "invalid segment name {name:?}"
            )));
        }
        if bytes.is_empty() {
            return Err(RillError::ShmError(format!(
                "segment {name:?} must not be empty"
            )));
        }
        if self.segments.iter().any(|s| s.name == name) {
            return Err(RillError::ShmError(format!(
                "segment {name:?} already registered"
            )));
        }

        let path = shm_dir().join(format!("rill-{}-{name}", self.tag));
        let (_file, mut map) = create_mapping(&path, bytes.len())?;
        map.copy_from_slice(bytes);
        debug!(name, len = bytes.len(), "shared-memory segment registered");
        self.segments.push(ShmSegment {
            name: name.to_string(),
            path,
            map,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ShmSegment> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ShmSegment> {
        self.segments.iter_mut().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Stop owning the backing files (worker side after fork).
    pub(crate) fn disown(&mut self) {
        self.owner = false;
    }

    /// Unmap and unlink every segment. Idempotent.
    pub(crate) fn release(&mut self) {
        for seg in self.segments.drain(..) {
            if let Err(e) = fs::remove_file(&seg.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(name = %seg.name, "segment unlink failed: {e}");
                }
            }
        }
    }
}

impl Drop for ShmRegistry {
    fn drop(&mut self) {
        if self.owner {
            self.release();
        }
    }
}
