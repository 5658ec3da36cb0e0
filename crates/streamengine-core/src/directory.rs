//! Window-fault entry point for the windowing subsystem's error callback.
//!
//! The callback runs on a foreign thread. It reads a published
//! [`WindowDirectory`] snapshot to classify the fault and, at most, schedules
//! a [`Task::RemoveDefunct`]; the binding collections are never touched here.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::binding::{BindingKind, WindowId};
use crate::registry::BindingRegistry;
use crate::scheduler::{Scheduler, Task};

/// Per-window view published after every engine mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub kind: BindingKind,
    pub removing: bool,
}

/// Read-only snapshot of the binding collections.
#[derive(Debug, Clone, Default)]
pub struct WindowDirectory {
    windows: HashMap<WindowId, DirectoryEntry>,
    any_removing: bool,
}

impl WindowDirectory {
    /// Snapshot the registry. Preview entries shadow output entries for the
    /// same window, matching lookup order.
    #[must_use]
    pub fn from_registry(registry: &BindingRegistry) -> Self {
        let mut windows = HashMap::new();
        for kind in [BindingKind::Output, BindingKind::Preview] {
            for binding in registry.iter(kind) {
                windows.insert(binding.window_id(), DirectoryEntry { kind, removing: binding.is_removing() });
            }
        }
        Self { windows, any_removing: registry.any_removing() }
    }

    #[must_use]
    pub fn lookup(&self, window: WindowId) -> Option<DirectoryEntry> {
        self.windows.get(&window).copied()
    }

    #[must_use]
    pub fn any_removing(&self) -> bool {
        self.any_removing
    }

    fn with_removing(&self, window: WindowId) -> Self {
        let mut next = self.clone();
        if let Some(entry) = next.windows.get_mut(&window) {
            entry.removing = true;
            next.any_removing = true;
        }
        next
    }
}

/// Display-server fault subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFault {
    BadWindow(WindowId),
    BadDrawable(WindowId),
    BadValue(WindowId),
    /// Transient drawing-context error; carries the context id, not a window
    BadGraphicsContext(u64),
}

/// What the fault handler did with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDisposition {
    /// Not ours; the windowing layer should apply its default handling
    Declined,
    /// Ours, but expected noise
    Ignored,
    /// A removal was scheduled onto the control loop
    Scheduled,
}

impl FaultDisposition {
    /// Whether the fault was claimed.
    #[must_use]
    pub fn handled(self) -> bool {
        !matches!(self, Self::Declined)
    }
}

/// `Send + Sync` handle installed into the windowing layer's error callback.
#[derive(Debug, Clone)]
pub struct WindowFaultHandle {
    directory: Arc<ArcSwap<WindowDirectory>>,
    scheduler: Scheduler,
}

impl WindowFaultHandle {
    pub(crate) fn new(directory: Arc<ArcSwap<WindowDirectory>>, scheduler: Scheduler) -> Self {
        Self { directory, scheduler }
    }

    /// Classify a fault and schedule a removal when one is due.
    pub fn report(&self, fault: WindowFault) -> FaultDisposition {
        let directory = self.directory.load();
        match fault {
            WindowFault::BadWindow(window) | WindowFault::BadDrawable(window) => {
                let Some(entry) = directory.lookup(window) else {
                    debug!(?fault, "Fault not for a preview or output window, not handling");
                    return FaultDisposition::Declined;
                };
                if entry.removing {
                    debug!(?fault, kind = %entry.kind, "Fault for a window being removed, ignoring");
                    return FaultDisposition::Ignored;
                }

                debug!(?fault, kind = %entry.kind, "Scheduling sink removal");
                // Later faults for this window read as in-flight noise until
                // the loop republishes.
                self.directory.rcu(|current| current.with_removing(window));
                self.scheduler.schedule(Task::RemoveDefunct { window });
                FaultDisposition::Scheduled
            }
            WindowFault::BadValue(window) => {
                if directory.lookup(window).is_some() {
                    debug!(?fault, "Fault for a known window, ignoring");
                    FaultDisposition::Ignored
                } else {
                    debug!(?fault, "Fault not for a preview or output window, not handling");
                    FaultDisposition::Declined
                }
            }
            WindowFault::BadGraphicsContext(_) => {
                if directory.any_removing() {
                    debug!(?fault, "Fault while a window is being removed, ignoring");
                    FaultDisposition::Ignored
                } else {
                    debug!(?fault, "Fault when no window is being removed, not handling");
                    FaultDisposition::Declined
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{PostRemovalAction, RemovalStage, WindowSinkBinding};
    use crate::scheduler::TaskQueue;

    fn handle_for(registry: &BindingRegistry) -> (WindowFaultHandle, TaskQueue) {
        let (scheduler, queue) = Scheduler::channel();
        let directory = Arc::new(ArcSwap::from_pointee(WindowDirectory::from_registry(registry)));
        (WindowFaultHandle::new(directory, scheduler), queue)
    }

    #[test]
    fn test_unknown_window_declined() {
        let (handle, mut queue) = handle_for(&BindingRegistry::new());
        assert_eq!(handle.report(WindowFault::BadWindow(WindowId(4))), FaultDisposition::Declined);
        assert_eq!(handle.report(WindowFault::BadValue(WindowId(4))), FaultDisposition::Declined);
        assert_eq!(handle.report(WindowFault::BadGraphicsContext(9)), FaultDisposition::Declined);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_bad_window_schedules_once() {
        let mut registry = BindingRegistry::new();
        registry.insert(BindingKind::Preview, WindowSinkBinding::preview(WindowId(4)));
        let (handle, mut queue) = handle_for(&registry);

        assert_eq!(handle.report(WindowFault::BadWindow(WindowId(4))), FaultDisposition::Scheduled);
        assert_eq!(handle.report(WindowFault::BadDrawable(WindowId(4))), FaultDisposition::Ignored);
        assert_eq!(handle.report(WindowFault::BadGraphicsContext(1)), FaultDisposition::Ignored);

        assert_eq!(queue.try_recv(), Some(Task::RemoveDefunct { window: WindowId(4) }));
        assert!(queue.try_recv().is_none());
        // the collections themselves are untouched
        assert!(!registry.get(BindingKind::Preview, WindowId(4)).unwrap().is_removing());
    }

    #[test]
    fn test_bad_value_for_known_window_ignored() {
        let mut registry = BindingRegistry::new();
        registry.insert(BindingKind::Output, WindowSinkBinding::preview(WindowId(8)));
        let (handle, mut queue) = handle_for(&registry);
        assert_eq!(handle.report(WindowFault::BadValue(WindowId(8))), FaultDisposition::Ignored);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_removing_window_from_snapshot_is_ignored() {
        let mut registry = BindingRegistry::new();
        registry.insert(BindingKind::Preview, WindowSinkBinding::preview(WindowId(2)));
        registry.begin_removal(
            BindingKind::Preview,
            WindowId(2),
            RemovalStage::BlockRequested,
            PostRemovalAction::Destroy,
        );
        let (handle, _queue) = handle_for(&registry);
        assert_eq!(handle.report(WindowFault::BadWindow(WindowId(2))), FaultDisposition::Ignored);
        assert!(handle.report(WindowFault::BadGraphicsContext(3)).handled());
    }
}
