//! Per-thread unique-id allocator (spec §2, §5, §9).
//!
//! The only process-wide state this crate carries. Confined to thread-local storage with a
//! well-defined reset point (conceptually, before compiling a graph) so that two threads
//! compiling the same source independently produce byte-identical kernel text and hit the same
//! source cache (spec §8 property 1).

use core::cell::Cell;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Returns the next value from this thread's monotonic counter, starting at `0`.
pub fn next_id() -> u64 {
    NEXT_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        id
    })
}

/// Resets this thread's counter to `0`. Callers should invoke this before compiling a graph, per
/// spec §9's "well-defined reset point" note, so that repeated compilations of the same graph on
/// the same thread produce the same temporary names.
pub fn reset() {
    NEXT_ID.with(|cell| cell.set(0));
}

/// Returns a fresh name of the form `_temp<id>_`, the pre-renumbering format `translateWrites`
/// and `UserCode` emit for local temporaries (spec §4.5/§4.6). The final assembly pass in
/// [`crate::hyperkernel`] rewrites every such token to `_temp_1`, `_temp_2`, … in
/// first-appearance order.
pub fn next_temp_name() -> String {
    format!("_temp{}_", next_id())
}
