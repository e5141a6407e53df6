//! Error types shared by every allocator component.
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. All failure
//! descriptions are static so errors stay `Clone + Eq` and allocation-free,
//! which matters inside allocators.

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

/// Allocation errors.
///
/// `Unsupported` is the "structurally impossible" answer (an operation the
/// component cannot perform by construction), while `OutOfMemory` is the
/// "declined / exhausted" answer. Composites such as
/// [`FallbackAllocator`](crate::allocator::FallbackAllocator) rely on that
/// distinction being stable.
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The backing store cannot satisfy the request.
    #[error("out of memory: {size} bytes with {align} byte alignment")]
    OutOfMemory { size: usize, align: usize },

    /// The requested alignment is incompatible with the component (for
    /// example, stricter than a slab pool's block alignment).
    #[error("invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    /// The operation is structurally impossible for this component.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },

    /// Guard bytes were overwritten, or a block was presented to a composite
    /// that no sub-allocator owns.
    #[error("integrity violation in {component}: {details}")]
    IntegrityViolation {
        component: &'static str,
        details: &'static str,
    },

    /// Layout arithmetic overflowed.
    #[error("size overflow during {operation}")]
    SizeOverflow { operation: &'static str },

    /// Constructor-time validation failed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}

impl AllocError {
    /// Stable error code for categorization and log scraping.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "ALLOC:OOM",
            Self::InvalidAlignment { .. } => "ALLOC:ALIGN",
            Self::Unsupported { .. } => "ALLOC:UNSUPPORTED",
            Self::IntegrityViolation { .. } => "ALLOC:INTEGRITY",
            Self::SizeOverflow { .. } => "ALLOC:OVERFLOW",
            Self::InvalidConfig { .. } => "ALLOC:CONFIG",
        }
    }

    /// Whether retrying against a different allocator could succeed.
    ///
    /// Integrity violations and configuration errors are never retryable;
    /// retrying them elsewhere would hide corruption.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::Unsupported { .. } | Self::InvalidAlignment { .. }
        )
    }

    /// Check if this is an out-of-memory error.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Check if this is an integrity violation.
    #[must_use]
    pub const fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }

    /// Check if this is an unsupported-operation error.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    // --- Convenience constructors ---

    /// Out-of-memory error for a layout.
    #[must_use]
    pub fn out_of_memory(layout: Layout) -> Self {
        Self::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        }
    }

    /// Invalid alignment error.
    #[must_use]
    pub const fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Unsupported-operation error.
    #[must_use]
    pub const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Integrity violation. Logged as an error: corruption must never pass
    /// silently.
    pub fn integrity_violation(component: &'static str, details: &'static str) -> Self {
        #[cfg(feature = "logging")]
        error!(component, details, "memory integrity violation");

        Self::IntegrityViolation { component, details }
    }

    /// Size overflow during layout arithmetic.
    pub fn size_overflow(operation: &'static str) -> Self {
        #[cfg(feature = "logging")]
        warn!(operation, "size overflow");

        Self::SizeOverflow { operation }
    }

    /// Constructor-time configuration error.
    #[must_use]
    pub const fn invalid_config(reason: &'static str) -> Self {
        Self::InvalidConfig { reason }
    }
}

/// Result type for allocator operations.
pub type AllocResult<T> = core::result::Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AllocError::out_of_memory(Layout::from_size_align(1024, 8).unwrap());
        assert!(error.to_string().contains("1024"));
        assert!(error.to_string().contains("8"));

        let error = AllocError::unsupported("interior grow");
        assert!(error.to_string().contains("interior grow"));
    }

    #[test]
    fn test_error_codes() {
        let layout = Layout::new::<u64>();
        assert_eq!(AllocError::out_of_memory(layout).code(), "ALLOC:OOM");
        assert_eq!(AllocError::invalid_alignment(128).code(), "ALLOC:ALIGN");
        assert_eq!(
            AllocError::integrity_violation("affix", "suffix guard overwritten").code(),
            "ALLOC:INTEGRITY"
        );
        assert_eq!(AllocError::size_overflow("affix layout").code(), "ALLOC:OVERFLOW");
    }

    #[test]
    fn test_classification() {
        let layout = Layout::new::<u64>();
        assert!(AllocError::out_of_memory(layout).is_out_of_memory());
        assert!(AllocError::out_of_memory(layout).is_retryable());
        assert!(AllocError::unsupported("grow").is_retryable());

        let violation = AllocError::integrity_violation("affix", "prefix guard overwritten");
        assert!(violation.is_integrity_violation());
        assert!(!violation.is_retryable());
    }
}
