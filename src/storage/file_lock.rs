use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::core::error::{Error, ErrorKind, Result};

/// Enforces the single-writer discipline (spec.md 5, "Scheduling model") across
/// processes via an advisory `flock`. Readers take a shared lock; the writer takes
/// an exclusive one.
pub struct FileLock {
    file: File,
    exclusive: bool,
}

impl FileLock {
    pub fn acquire(path: &Path, exclusive: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        #[cfg(unix)]
        {
            use libc::{flock, LOCK_EX, LOCK_NB, LOCK_SH};
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            let operation = (if exclusive { LOCK_EX } else { LOCK_SH }) | LOCK_NB;

            let rc = unsafe { flock(fd, operation) };
            if rc != 0 {
                return Err(Error::new(
                    ErrorKind::IoFailure,
                    format!(
                        "failed to acquire {} lock on {}",
                        if exclusive { "exclusive" } else { "shared" },
                        path.display()
                    ),
                ));
            }
        }

        Ok(FileLock { file, exclusive })
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_UN};
            use std::os::unix::io::AsRawFd;

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
