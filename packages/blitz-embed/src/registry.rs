use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::{EmbedError, Result};
use crate::window::WindowBinding;

/// Host-assigned identifier of an embedded browsing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u32);

impl WindowId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for WindowId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps window ids to their live bindings.
///
/// Lives on the host's control thread; it is deliberately neither `Send` nor `Sync`. The
/// registry never keeps a binding alive: dropping the last `Rc<WindowBinding>` unregisters it.
#[derive(Default)]
pub struct WindowRegistry {
    windows: RefCell<FxHashMap<WindowId, Weak<WindowBinding>>>,
    shut_down: Cell<bool>,
}

impl WindowRegistry {
    pub fn init() -> Rc<Self> {
        tracing::debug!("window registry initialised");
        Rc::new(Self::default())
    }

    /// Create and register the binding for `id`.
    pub fn register_window(self: &Rc<Self>, id: WindowId) -> Result<Rc<WindowBinding>> {
        if self.shut_down.get() {
            tracing::error!(window = %id, "registration after registry shutdown");
            return Err(EmbedError::RegistryShutdown);
        }
        if self.windows.borrow().contains_key(&id) {
            tracing::error!(window = %id, "window id registered twice");
            debug_assert!(false, "window id {id} registered twice");
            return Err(EmbedError::DuplicateId(id));
        }
        let binding = Rc::new(WindowBinding::new(id, Rc::downgrade(self)));
        self.register(id, &binding)?;
        tracing::info!(window = %id, "window registered");
        Ok(binding)
    }

    pub(crate) fn register(&self, id: WindowId, binding: &Rc<WindowBinding>) -> Result<()> {
        let mut windows = self.windows.borrow_mut();
        if windows.contains_key(&id) {
            return Err(EmbedError::DuplicateId(id));
        }
        windows.insert(id, Rc::downgrade(binding));
        Ok(())
    }

    /// Only called from a binding's own teardown.
    pub(crate) fn unregister(&self, id: WindowId) -> Result<()> {
        self.windows
            .borrow_mut()
            .remove(&id)
            .map(|_| ())
            .ok_or(EmbedError::NotFound(id))
    }

    pub fn lookup(&self, id: WindowId) -> Option<Rc<WindowBinding>> {
        self.windows.borrow().get(&id).and_then(Weak::upgrade)
    }

    pub fn len(&self) -> usize {
        self.windows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.borrow().is_empty()
    }

    /// Refuse further registrations and report windows that are still alive.
    pub fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }
        let mut live: Vec<WindowId> = self
            .windows
            .borrow()
            .iter()
            .filter(|(_, binding)| binding.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect();
        live.sort_unstable();
        if live.is_empty() {
            tracing::info!("window registry shut down");
        } else {
            tracing::warn!(windows = ?live, "window registry shut down with live windows");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }
}
