use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::{CancelLoad, LoadCompletion, LoadError, SourceLoader, SourceOptions, SourcePixels};

/// Loader driven by its owner instead of by I/O.
///
/// In *immediate* mode every load finishes synchronously with a solid image of
/// the configured size. In *deferred* mode completions are parked until the owner
/// calls [`complete_next`](Self::complete_next) or [`fail_next`](Self::fail_next),
/// which makes it the tool of choice for tests and for sources fed by an external
/// producer (video frames, remote thumbnails).
///
/// Clones share state, so one clone can be installed in a texture while another
/// observes call and cancellation counts.
#[derive(Clone)]
pub struct ManualLoader {
    inner: Rc<Inner>,
}

struct Inner {
    size: (u32, u32),
    immediate: bool,
    pending: RefCell<VecDeque<LoadCompletion>>,
    loads: Cell<usize>,
    cancellations: Rc<Cell<usize>>,
}

impl ManualLoader {
    pub fn immediate(width: u32, height: u32) -> Self {
        Self::with_mode(width, height, true)
    }

    pub fn deferred(width: u32, height: u32) -> Self {
        Self::with_mode(width, height, false)
    }

    fn with_mode(width: u32, height: u32, immediate: bool) -> Self {
        Self {
            inner: Rc::new(Inner {
                size: (width, height),
                immediate,
                pending: RefCell::new(VecDeque::new()),
                loads: Cell::new(0),
                cancellations: Rc::new(Cell::new(0)),
            }),
        }
    }

    /// Number of times a load was started.
    pub fn loads(&self) -> usize {
        self.inner.loads.get()
    }

    /// Number of times the pool cancelled a load.
    pub fn cancellations(&self) -> usize {
        self.inner.cancellations.get()
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Finishes the oldest parked load. Returns `false` if none is parked.
    pub fn complete_next(&self) -> bool {
        let next = self.inner.pending.borrow_mut().pop_front();
        match next {
            Some(completion) => {
                completion.succeed(self.options());
                true
            }
            None => false,
        }
    }

    /// Fails the oldest parked load. Returns `false` if none is parked.
    pub fn fail_next(&self, error: LoadError) -> bool {
        let next = self.inner.pending.borrow_mut().pop_front();
        match next {
            Some(completion) => {
                completion.fail(error);
                true
            }
            None => false,
        }
    }

    fn options(&self) -> SourceOptions {
        let (w, h) = self.inner.size;
        SourceOptions::new(SourcePixels::filled(w, h, [255, 255, 255, 255]))
    }
}

impl SourceLoader for ManualLoader {
    fn load(&self, completion: LoadCompletion) -> Option<CancelLoad> {
        self.inner.loads.set(self.inner.loads.get() + 1);

        if self.inner.immediate {
            completion.succeed(self.options());
            return None;
        }

        self.inner.pending.borrow_mut().push_back(completion);
        let cancellations = Rc::clone(&self.inner.cancellations);
        Some(Box::new(move || cancellations.set(cancellations.get() + 1)))
    }
}
