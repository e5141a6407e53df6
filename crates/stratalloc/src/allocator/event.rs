//! Operation descriptors emitted by observing wrappers.
//!
//! Every mutating allocator operation (and ownership query) can be described
//! by one [`AllocEvent`] value. [`ProxyAllocator`](super::ProxyAllocator)
//! hands events to observers after the operation completes; the tracked
//! wrappers feed them through an [`EventFilter`](super::EventFilter) before
//! updating statistics. Events are plain `Copy` data and never influence the
//! outcome of the operation they describe.

use core::alloc::Layout;

/// Description of one completed allocator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocEvent {
    /// `allocate` or `allocate_zeroed` finished.
    Allocate {
        layout: Layout,
        /// Whether the request asked for zero-filled memory.
        zeroed: bool,
        succeeded: bool,
    },
    /// `grow` finished.
    Grow {
        old_layout: Layout,
        new_layout: Layout,
        succeeded: bool,
        /// Whether the block kept its address. Only meaningful on success.
        in_place: bool,
    },
    /// `shrink` finished.
    Shrink {
        old_layout: Layout,
        new_layout: Layout,
        succeeded: bool,
        /// Whether the block kept its address. Only meaningful on success.
        in_place: bool,
    },
    /// `deallocate` finished. Deallocation has no failure channel.
    Deallocate { layout: Layout },
    /// An `owns` query was answered.
    OwnsQuery { owned: bool },
}

impl AllocEvent {
    /// Whether the described operation succeeded.
    ///
    /// Deallocations and ownership queries always count as succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        match self {
            Self::Allocate { succeeded, .. }
            | Self::Grow { succeeded, .. }
            | Self::Shrink { succeeded, .. } => *succeeded,
            Self::Deallocate { .. } | Self::OwnsQuery { .. } => true,
        }
    }

    /// The layout the operation produced or released, where one exists.
    ///
    /// For `grow`/`shrink` this is the new layout.
    #[must_use]
    pub const fn layout(&self) -> Option<Layout> {
        match self {
            Self::Allocate { layout, .. } | Self::Deallocate { layout } => Some(*layout),
            Self::Grow { new_layout, .. } | Self::Shrink { new_layout, .. } => Some(*new_layout),
            Self::OwnsQuery { .. } => None,
        }
    }

    /// Placement of a reallocation, if the event describes one.
    #[must_use]
    pub const fn in_place(&self) -> Option<bool> {
        match self {
            Self::Grow { in_place, .. } | Self::Shrink { in_place, .. } => Some(*in_place),
            _ => None,
        }
    }

    /// Whether the event describes a reallocation (`grow` or `shrink`).
    #[must_use]
    pub const fn is_realloc(&self) -> bool {
        matches!(self, Self::Grow { .. } | Self::Shrink { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let event = AllocEvent::Allocate {
            layout,
            zeroed: true,
            succeeded: true,
        };
        assert!(event.succeeded());
        assert_eq!(event.layout(), Some(layout));
        assert_eq!(event.in_place(), None);
        assert!(!event.is_realloc());

        let grown = Layout::from_size_align(128, 8).unwrap();
        let event = AllocEvent::Grow {
            old_layout: layout,
            new_layout: grown,
            succeeded: true,
            in_place: false,
        };
        assert!(event.is_realloc());
        assert_eq!(event.layout(), Some(grown));
        assert_eq!(event.in_place(), Some(false));

        let event = AllocEvent::OwnsQuery { owned: false };
        assert!(event.succeeded());
        assert_eq!(event.layout(), None);
    }
}
