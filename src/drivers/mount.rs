//! OS mount primitive
//!
//! [`SysMounter`] issues real bind mounts through `nix`. It needs
//! CAP_SYS_ADMIN; tests use the recording mounter instead.

use crate::domain::ports::Mounter;
use crate::error::{Error, Result};
use nix::mount::{MntFlags, MsFlags};
use std::path::Path;
use tracing::debug;

/// Mounter backed by the mount(2)/umount2(2) syscalls
#[derive(Debug, Clone, Copy, Default)]
pub struct SysMounter;

impl Mounter for SysMounter {
    fn mount(&self, source: &Path, target: &Path, fs_type: Option<&str>) -> Result<()> {
        debug!(
            source = %source.display(),
            target = %target.display(),
            fs_type = fs_type.unwrap_or("none"),
            "bind mount"
        );
        nix::mount::mount(
            Some(source),
            target,
            fs_type,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| Error::Mount {
            path: target.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        debug!(target = %target.display(), "unmount");
        nix::mount::umount2(target, MntFlags::empty()).map_err(|e| Error::Unmount {
            path: target.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Mounter that only records bindings; it can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingMounter {
        bindings: Mutex<HashMap<PathBuf, (PathBuf, Option<String>)>>,
        fail_mount: AtomicBool,
        fail_unmount: AtomicBool,
    }

    impl RecordingMounter {
        pub(crate) fn fail_mounts(&self, fail: bool) {
            self.fail_mount.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn fail_unmounts(&self, fail: bool) {
            self.fail_unmount.store(fail, Ordering::SeqCst);
        }

        /// Current `(target, source, fs_type)` bindings
        pub(crate) fn mounts(&self) -> Vec<(PathBuf, PathBuf, Option<String>)> {
            self.bindings
                .lock()
                .iter()
                .map(|(target, (source, fs))| (target.clone(), source.clone(), fs.clone()))
                .collect()
        }
    }

    impl Mounter for RecordingMounter {
        fn mount(&self, source: &Path, target: &Path, fs_type: Option<&str>) -> Result<()> {
            if self.fail_mount.load(Ordering::SeqCst) {
                return Err(Error::Mount {
                    path: target.display().to_string(),
                    reason: "EPERM: Operation not permitted".into(),
                });
            }
            self.bindings.lock().insert(
                target.to_path_buf(),
                (source.to_path_buf(), fs_type.map(str::to_string)),
            );
            Ok(())
        }

        fn unmount(&self, target: &Path) -> Result<()> {
            if self.fail_unmount.load(Ordering::SeqCst) {
                return Err(Error::Unmount {
                    path: target.display().to_string(),
                    reason: "EBUSY: Device or resource busy".into(),
                });
            }
            match self.bindings.lock().remove(target) {
                Some(_) => Ok(()),
                None => Err(Error::Unmount {
                    path: target.display().to_string(),
                    reason: "EINVAL: Invalid argument".into(),
                }),
            }
        }
    }
}
