// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error taxonomy for the frame core.
//!
//! There are exactly two families of failure:
//!
//! - [`ContractViolation`]: the caller broke an ordering or sizing contract (allocating after
//!   `finish`, updating more bytes than a slot holds, recording a barrier on a copy list,
//!   exhausting a fixed ring).  These indicate a bug in the calling code.
//! - [`Error::Platform`]: the backend or driver failed (resource creation, device removal).
//!   These carry the backend's status code.
//!
//! Both are fatal.  Nothing in this crate retries or degrades; operations fail immediately and
//! it is up to the outermost application boundary to report the error and exit.

use std::fmt::{Display, Formatter};
use std::panic::Location;

/// The category of a [`ContractViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// An allocation or finalization was requested after the owning allocator was finished.
    AfterFinish,
    /// An address, handle, or update was requested before the owning allocator was finished.
    BeforeFinish,
    /// More bytes were supplied than the destination slot holds.
    UpdateTooLarge,
    /// An index, offset, resource id, or mip level does not name anything.
    UnknownIndex,
    /// A fixed-capacity ring or table has no slots left.
    Exhausted,
    /// The operation is not supported on this kind of command list.
    WrongCommandList,
    /// A copy reads and writes the same buffer.
    SelfCopy,
    /// The allocation was created with a different update policy.
    PolicyMismatch,
    /// Configuration values are out of range.
    InvalidConfig,
    /// A frame-boundary call was made out of order.
    FrameOrder,
}

/// A caller bug detected by the frame core.
///
/// Carries the operation that detected it and the source location of the call into this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation {
    kind: ViolationKind,
    operation: &'static str,
    message: String,
    file: &'static str,
    line: u32,
}

impl ContractViolation {
    #[track_caller]
    pub(crate) fn new(
        kind: ViolationKind,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        let location = Location::caller();
        ContractViolation {
            kind,
            operation,
            message: message.into(),
            file: location.file(),
            line: location.line(),
        }
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// The operation that rejected the call, e.g. `UniformHeap::request_dynamic_space`.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl Display for ContractViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{operation}: {message} [{kind:?}] (called from {file}:{line})",
            operation = self.operation,
            message = self.message,
            kind = self.kind,
            file = self.file,
            line = self.line
        )
    }
}

impl std::error::Error for ContractViolation {}

/// Errors produced by the frame core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
    #[error("platform error (status {status:#010x}): {0}", status = .0.status())]
    Platform(#[from] crate::imp::Error),
}

impl Error {
    /// The violation kind, if this is a contract violation.
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            Error::ContractViolation(v) => Some(v.kind()),
            Error::Platform(_) => None,
        }
    }

    /// The backend status code, if this is a platform error.
    pub fn status(&self) -> Option<u32> {
        match self {
            Error::ContractViolation(_) => None,
            Error::Platform(e) => Some(e.status()),
        }
    }

    pub fn is_device_removed(&self) -> bool {
        matches!(self, Error::Platform(e) if e.is_device_removed())
    }
}

/// Builds an `Err(Error::ContractViolation(..))` located at the caller of the enclosing
/// `#[track_caller]` function.
macro_rules! violation {
    ($kind:ident, $operation:expr, $($message:tt)+) => {
        Err($crate::error::Error::ContractViolation(
            $crate::error::ContractViolation::new(
                $crate::error::ViolationKind::$kind,
                $operation,
                format!($($message)+),
            ),
        ))
    };
}
pub(crate) use violation;
