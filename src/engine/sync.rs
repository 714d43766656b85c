//! Synchronous read engine
//!
//! Uses blocking `pread` for positioned reads, so workers sharing one file
//! descriptor never disturb each other's file offset.
//!
//! # Features
//!
//! - Works with O_DIRECT handles (caller supplies an aligned buffer)
//! - Retries partial reads until the block is covered
//! - Retries on EINTR
//! - Stops at end of file without issuing a further read

use super::{ReadEngine, ReadOp};
use crate::Result;
use anyhow::Context;

/// Synchronous engine using `pread`
///
/// Stateless; one instance serves every worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncEngine;

impl SyncEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ReadEngine for SyncEngine {
    #[inline]
    fn read(&self, op: ReadOp<'_>) -> Result<usize> {
        let ReadOp {
            fd,
            offset,
            expected,
            buffer,
        } = op;

        let mut total_read = 0;

        while total_read < expected && total_read < buffer.len() {
            let remaining = &mut buffer[total_read..];
            let current_offset = offset + total_read as u64;

            // SAFETY: remaining is a valid, exclusively borrowed region of
            // remaining.len() bytes for the duration of the call
            let result = unsafe {
                libc::pread(
                    fd,
                    remaining.as_mut_ptr() as *mut libc::c_void,
                    remaining.len(),
                    current_offset as libc::off_t,
                )
            };

            if result < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err).context(format!(
                    "pread failed: fd={}, offset={}, length={}",
                    fd,
                    current_offset,
                    remaining.len()
                ));
            }

            if result == 0 {
                // EOF: the file shrank or the request ran past the end
                break;
            }

            total_read += result as usize;
        }

        Ok(total_read)
    }

    fn name(&self) -> &'static str {
        "sync"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;
    use tempfile::TempDir;

    fn read_at(file: &File, offset: u64, expected: usize, buffer: &mut [u8]) -> Result<usize> {
        SyncEngine::new().read(ReadOp {
            fd: file.as_raw_fd(),
            offset,
            expected,
            buffer,
        })
    }

    #[test]
    fn test_sync_engine_read() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_read.dat");
        let test_data = b"Hello, blockwarm! This is a test file for synchronous reads.";
        std::fs::write(&file_path, test_data).unwrap();

        let file = File::open(&file_path).unwrap();
        let mut buffer = vec![0u8; test_data.len()];
        let n = read_at(&file, 0, test_data.len(), &mut buffer).unwrap();

        assert_eq!(n, test_data.len());
        assert_eq!(&buffer[..], test_data);
    }

    #[test]
    fn test_sync_engine_read_at_offset() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_offset.dat");
        std::fs::write(&file_path, b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ").unwrap();

        let file = File::open(&file_path).unwrap();
        let mut buffer = vec![0u8; 10];
        let n = read_at(&file, 10, 10, &mut buffer).unwrap();

        assert_eq!(n, 10);
        assert_eq!(&buffer[..], b"ABCDEFGHIJ");
    }

    #[test]
    fn test_sync_engine_stops_at_eof() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_partial.dat");
        std::fs::write(&file_path, b"Short").unwrap();

        let file = File::open(&file_path).unwrap();
        // Request a full aligned buffer for a short tail, as direct IO does
        let mut buffer = vec![0u8; 4096];
        let n = read_at(&file, 0, 5, &mut buffer).unwrap();

        assert_eq!(n, 5);
        assert_eq!(&buffer[..5], b"Short");
    }

    #[test]
    fn test_sync_engine_read_past_end() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_past_end.dat");
        std::fs::write(&file_path, vec![7u8; 100]).unwrap();

        let file = File::open(&file_path).unwrap();
        let mut buffer = vec![0u8; 64];
        let n = read_at(&file, 200, 64, &mut buffer).unwrap();

        assert_eq!(n, 0);
    }

    #[test]
    fn test_sync_engine_expected_caps_reads() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test_cap.dat");
        std::fs::write(&file_path, vec![1u8; 8192]).unwrap();

        let file = File::open(&file_path).unwrap();
        let mut buffer = vec![0u8; 8192];
        // A single pread may already return more than expected; never less
        let n = read_at(&file, 0, 100, &mut buffer).unwrap();
        assert!(n >= 100);
    }

    #[test]
    fn test_sync_engine_invalid_fd() {
        let mut buffer = vec![0u8; 512];
        let result = SyncEngine::new().read(ReadOp {
            fd: -1,
            offset: 0,
            expected: 512,
            buffer: &mut buffer,
        });

        let err = result.unwrap_err();
        assert!(err.to_string().contains("pread failed"));
        assert!(err.to_string().contains("fd=-1"));
    }
}
