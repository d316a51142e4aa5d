//! Deferred deallocation for retired tracks
//!
//! A `basedrop` collector lets the audio thread drop its `Shared<Track>`
//! handle without freeing memory in the callback. Dropping only enqueues a
//! pointer; the actual deallocation of the decoded PCM (often tens of MB)
//! happens on a background thread where the latency doesn't matter.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating Shared<T> allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // The Collector is !Sync, so it lives on its own thread
    thread::Builder::new()
        .name("track-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Track GC thread started");

            loop {
                collector.collect();
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("Failed to spawn track GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating Shared<T> allocations
///
/// The handle is lightweight and can be cloned. Tracks wrapped in
/// `Shared::new(&gc_handle(), track)` can be dropped from any thread,
/// including the audio callback, without blocking.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
