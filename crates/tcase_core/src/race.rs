//! Runs blocks at the same time to shake out ordering assumptions.

use crate::error::Flow;
use std::panic;
use std::sync::Barrier;
use std::thread;

/// A block passed to [`race`].
pub type RaceBlock<'a> = Box<dyn FnOnce() -> Flow + Send + 'a>;

/// Starts every block on its own thread at the same moment and waits for all of them.
///
/// Returns the first abort in block order. A panic in any block is re-raised once every block
/// has finished.
pub fn race<'a>(blocks: Vec<RaceBlock<'a>>) -> Flow {
    let start = Barrier::new(blocks.len());
    let results: Vec<thread::Result<Flow>> = thread::scope(|scope| {
        let handles: Vec<_> = blocks
            .into_iter()
            .map(|block| {
                let start = &start;
                scope.spawn(move || {
                    start.wait();
                    block()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect()
    });

    let mut outcome = Ok(());
    let mut first_panic = None;
    for result in results {
        match result {
            Ok(Err(abort)) if outcome.is_ok() => outcome = Err(abort),
            Ok(_) => {}
            Err(payload) if first_panic.is_none() => first_panic = Some(payload),
            Err(_) => {}
        }
    }
    if let Some(payload) = first_panic {
        panic::resume_unwind(payload);
    }
    outcome
}
