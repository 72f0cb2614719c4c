//! The filesystem seam (spec.md §1, §6): an external collaborator the core
//! is specified against rather than owning. Mirrors the way `par2rs`'s
//! `RecoveryDataLoader` trait lets repair code run against either real
//! files or a substitute loader without caring which: here, a
//! [`Filesystem`] implementation backs every read/write/stat/walk the
//! enumerator (C4) and manifest store (C3) perform.
//!
//! [`OsFilesystem`] is the only implementation this crate ships — a thin
//! wrapper over `std::fs` and `walkdir` — and is what `enumerator` and
//! `manifest` use directly today. The trait exists so an embedder (or a
//! future in-memory test double) can substitute a different backend
//! without touching C3/C4's logic; per spec.md §4.3, a non-OS backend that
//! can't support advisory locking simply treats lock/unlock as a no-op.

use std::io;
use std::path::{Path, PathBuf};

/// One entry yielded by [`Filesystem::walk`]: either a concrete path, or an
/// error at a particular point in the walk (e.g. a permission-denied
/// subdirectory), mirroring `walkdir::Result`'s shape.
pub enum WalkEntry {
    Entry { path: PathBuf, is_dir: bool },
    Err { path: Option<PathBuf>, source: io::Error },
}

/// Per-entry instruction a [`Filesystem::walk`] callback returns: keep
/// descending, or skip the rest of the directory just yielded (spec.md §6:
/// "the ability for the callback to request skip-dir").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    SkipDir,
}

/// Minimal file metadata the core needs (spec.md §6: "stat (size, mode,
/// modtime)"). Mode is `None` on platforms without a Unix permission bit.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub size: u64,
    pub mode: Option<u32>,
    pub modified: Option<std::time::SystemTime>,
}

/// The filesystem operations the core consumes (spec.md §6): open-for-read,
/// read-file, write-file with mode, stat, mkdir-all, and a recursive walk
/// whose callback can request skip-dir. Every core component that touches
/// disk is specified against this trait rather than `std::fs` directly.
pub trait Filesystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()>;
    fn stat(&self, path: &Path) -> io::Result<Stat>;
    fn exists(&self, path: &Path) -> bool;
    fn mkdir_all(&self, path: &Path) -> io::Result<()>;

    /// Walk `root` recursively, calling `visit` for each entry in turn.
    /// `visit` returns [`WalkControl::SkipDir`] to prune a just-yielded
    /// directory from further descent.
    fn walk(&self, root: &Path, visit: &mut dyn FnMut(WalkEntry) -> WalkControl);
}

/// The default, OS-backed implementation: every call is a thin pass-through
/// to `std::fs` (and `walkdir` for the recursive walk).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        std::fs::write(path, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
        }
        Ok(())
    }

    fn stat(&self, path: &Path) -> io::Result<Stat> {
        let meta = std::fs::metadata(path)?;
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(meta.permissions().mode())
        };
        #[cfg(not(unix))]
        let mode = None;
        Ok(Stat {
            size: meta.len(),
            mode,
            modified: meta.modified().ok(),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn walk(&self, root: &Path, visit: &mut dyn FnMut(WalkEntry) -> WalkControl) {
        let mut walker = walkdir::WalkDir::new(root).into_iter();
        loop {
            let item = match walker.next() {
                None => break,
                Some(item) => item,
            };
            match item {
                Ok(entry) => {
                    let control = visit(WalkEntry::Entry {
                        path: entry.path().to_path_buf(),
                        is_dir: entry.file_type().is_dir(),
                    });
                    if control == WalkControl::SkipDir && entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                }
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf());
                    visit(WalkEntry::Err { path, source: e.into() });
                }
            }
        }
    }
}
