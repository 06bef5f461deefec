//! Status codes returned across the engine boundary

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal status of a bridge callback
///
/// These values are consumed by the native engine as-is. The numeric
/// codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum FileStatus {
    /// Operation succeeded
    Ok = 0,
    /// The identifier did not resolve to a file
    NotFound = 1,
    /// The file exists but could not be opened
    Bad = 2,
    /// The handle is unknown or already closed
    InvalidHandle = 3,
    /// No bytes could be produced; the cursor is at or past the end
    EndOfData = 4,
    /// Fewer bytes than requested; the resource ended mid-read
    Eof = 5,
    /// The asynchronous read was cancelled
    DiskEjected = 6,
    /// Unexpected fault inside the bridge
    Internal = 7,
}

impl FileStatus {
    /// Stable numeric code for this status
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Inverse of [`FileStatus::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Ok,
            1 => Self::NotFound,
            2 => Self::Bad,
            3 => Self::InvalidHandle,
            4 => Self::EndOfData,
            5 => Self::Eof,
            6 => Self::DiskEjected,
            7 => Self::Internal,
            _ => return None,
        })
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Classify the outcome of a read of `requested` bytes that produced `read`
    ///
    /// A zero-length request is always `Ok`. Otherwise zero bytes is
    /// `EndOfData` and a short read is `Eof`.
    pub fn for_read(requested: usize, read: usize) -> Self {
        if requested == 0 || read >= requested {
            Self::Ok
        } else if read == 0 {
            Self::EndOfData
        } else {
            Self::Eof
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Ok => write!(f, "ok"),
            FileStatus::NotFound => write!(f, "file not found"),
            FileStatus::Bad => write!(f, "bad file"),
            FileStatus::InvalidHandle => write!(f, "invalid handle"),
            FileStatus::EndOfData => write!(f, "end of data"),
            FileStatus::Eof => write!(f, "end of file"),
            FileStatus::DiskEjected => write!(f, "disk ejected"),
            FileStatus::Internal => write!(f, "internal error"),
        }
    }
}
