//! Live-view registry for the C boundary
//!
//! Record, array and number pointers handed to C borrow from the expression
//! they came from. With the `checked-views` feature every such pointer is
//! recorded here together with its owner; overwriting or freeing the owner
//! drops its entries, and the `knot_*` accessors refuse (abort on) pointers
//! that are no longer registered. Without the feature these are no-ops.
//!
//! Detection is best effort: an address reused by a later allocation of the
//! same kind looks live again.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Number,
    Record,
    Array,
}

#[cfg(feature = "checked-views")]
mod registry {
    use super::ViewKind;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// (view address, kind) -> owning expression address
    type Table = HashMap<(usize, ViewKind), usize>;

    static VIEWS: OnceLock<Mutex<Table>> = OnceLock::new();

    fn table() -> MutexGuard<'static, Table> {
        VIEWS
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(view: usize, kind: ViewKind, owner: usize) {
        table().insert((view, kind), owner);
    }

    pub fn invalidate_owner(owner: usize) {
        let mut table = table();
        let before = table.len();
        table.retain(|_, o| *o != owner);
        let dropped = before - table.len();
        if dropped > 0 {
            tracing::trace!(owner, dropped, "invalidated views");
        }
    }

    pub fn is_live(view: usize, kind: ViewKind) -> bool {
        table().contains_key(&(view, kind))
    }

    pub fn live_count() -> usize {
        table().len()
    }
}

#[cfg(not(feature = "checked-views"))]
mod registry {
    use super::ViewKind;

    pub fn register(_view: usize, _kind: ViewKind, _owner: usize) {}

    pub fn invalidate_owner(_owner: usize) {}

    pub fn is_live(_view: usize, _kind: ViewKind) -> bool {
        true
    }

    pub fn live_count() -> usize {
        0
    }
}

pub use registry::{invalidate_owner, is_live, live_count, register};

/// Abort-on-misuse check used by every accessor taking a view pointer
pub(crate) fn ensure_live(view: usize, kind: ViewKind) {
    if !is_live(view, kind) {
        panic!(
            "use of an invalidated {:?} view at {:#x}: its expression was overwritten or freed",
            kind, view
        );
    }
}
