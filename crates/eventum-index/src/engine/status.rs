//! Operation status and per-record information.

use std::fmt;

/// Status returned by engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed.
    #[default]
    Ok = 0,
    /// Key was not found.
    NotFound = 1,
    /// The record is on disk; call `complete_pending` to finish.
    Pending = 2,
    /// The record could not be read back.
    Error = 3,
}

impl Status {
    /// Check if the status indicates success.
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the operation is pending.
    #[inline]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Status::Pending)
    }

    /// Check if the key was not found.
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound)
    }

    /// Get the status as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::NotFound => "NotFound",
            Status::Pending => "Pending",
            Status::Error => "Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags reported for each record by a log scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordInfo {
    /// The record marks a delete.
    pub tombstone: bool,
    /// The record was abandoned and must be ignored.
    pub invalid: bool,
}

impl RecordInfo {
    /// Returns true if the record carries a live value.
    #[inline]
    pub const fn is_live(&self) -> bool {
        !self.tombstone && !self.invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(Status::Ok.is_ok());
        assert!(Status::Pending.is_pending());
        assert!(Status::NotFound.is_not_found());
        assert!(!Status::Error.is_ok());
        assert_eq!(Status::default(), Status::Ok);
        assert_eq!(Status::Pending.to_string(), "Pending");
    }

    #[test]
    fn test_record_info_liveness() {
        assert!(RecordInfo::default().is_live());
        assert!(!RecordInfo {
            tombstone: true,
            invalid: false
        }
        .is_live());
        assert!(!RecordInfo {
            tombstone: false,
            invalid: true
        }
        .is_live());
    }
}
