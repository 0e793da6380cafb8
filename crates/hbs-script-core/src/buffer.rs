//! Per-thread scratch buffer that templates render into.
//!
//! Every render thread keeps one `Vec<u8>` and reuses it across renders, so steady-state
//! execution does not allocate an output buffer per request. The buffer is cleared before
//! each use. If a render made it grow past [`BufferConfig::max_retained_capacity`] it is
//! shrunk back afterwards, so one huge query body does not pin memory on that thread.
//!
//! A render that starts while the same thread's buffer is already borrowed (a helper
//! rendering another template) gets a fresh buffer instead.

use std::cell::RefCell;

use handlebars::Output;

use crate::config::BufferConfig;

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with this thread's cleared scratch buffer.
pub fn with_scratch<R>(config: &BufferConfig, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut buf) => {
            buf.clear();
            if buf.capacity() < config.initial_capacity {
                buf.reserve(config.initial_capacity);
            }
            let result = f(&mut buf);
            if buf.capacity() > config.max_retained_capacity {
                buf.clear();
                buf.shrink_to(config.initial_capacity);
            }
            result
        }
        Err(_) => {
            tracing::trace!("scratch buffer busy on this thread, using a fresh one");
            let mut buf = Vec::with_capacity(config.initial_capacity);
            f(&mut buf)
        }
    })
}

/// Capacity of this thread's scratch buffer, for diagnostics.
pub fn retained_capacity() -> usize {
    SCRATCH.with(|cell| cell.try_borrow().map(|buf| buf.capacity()).unwrap_or(0))
}

/// Handlebars [`Output`] that appends UTF-8 into a byte buffer.
pub struct BufferOutput<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> BufferOutput<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }
}

impl Output for BufferOutput<'_> {
    fn write(&mut self, seg: &str) -> Result<(), std::io::Error> {
        self.buf.extend_from_slice(seg.as_bytes());
        Ok(())
    }
}
