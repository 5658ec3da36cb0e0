//! Process-wide Xlib error hook.
//!
//! Render elements draw into client-owned X windows. When a client destroys
//! its window first, Xlib reports the failure through the global error
//! handler on whatever thread made the request. The hook turns the
//! interesting error codes into [`WindowFault`]s for the engine and hands
//! everything it does not claim to the handler that was installed before.

use std::os::raw::{c_int, c_uchar, c_ulong};

use parking_lot::RwLock;
use streamengine_core::{WindowFault, WindowFaultHandle, WindowId};
use tracing::{debug, info};
use x11_dl::xlib;

use crate::error::{GstError, GstResult};

/// Xlib's error handler type, as taken and returned by `XSetErrorHandler`.
type XErrorHandler = Option<unsafe extern "C" fn(*mut xlib::Display, *mut xlib::XErrorEvent) -> c_int>;

struct Hook {
    handle: WindowFaultHandle,
    previous: XErrorHandler,
}

static HOOK: RwLock<Option<Hook>> = parking_lot::const_rwlock(None);

/// Route X errors to `handle`. Installing again only swaps the handle.
///
/// # Errors
/// Returns an error if libX11 cannot be loaded.
pub fn install(handle: WindowFaultHandle) -> GstResult<()> {
    let mut hook = HOOK.write();
    if let Some(hook) = hook.as_mut() {
        debug!("X error hook already installed, replacing fault handle");
        hook.handle = handle;
        return Ok(());
    }

    let xlib = xlib::Xlib::open().map_err(|e| GstError::DisplayLibrary(e.to_string()))?;
    // the handler lives in this library for the rest of the process
    let xlib: &'static xlib::Xlib = Box::leak(Box::new(xlib));

    // SAFETY: installed before any pipeline exists, so no Xlib call races it
    #[allow(unsafe_code)]
    let previous = unsafe { (xlib.XSetErrorHandler)(Some(on_x_error)) };

    *hook = Some(Hook { handle, previous });
    info!("X error hook installed");
    Ok(())
}

/// Map an Xlib error code to the fault it means for a bound window.
fn classify(error_code: c_uchar, resource: c_ulong) -> Option<WindowFault> {
    let window = WindowId(u64::from(resource));
    match error_code {
        xlib::BadWindow => Some(WindowFault::BadWindow(window)),
        xlib::BadDrawable => Some(WindowFault::BadDrawable(window)),
        xlib::BadValue => Some(WindowFault::BadValue(window)),
        xlib::BadGC => Some(WindowFault::BadGraphicsContext(u64::from(resource))),
        _ => None,
    }
}

#[allow(unsafe_code)]
unsafe extern "C" fn on_x_error(display: *mut xlib::Display, event: *mut xlib::XErrorEvent) -> c_int {
    // SAFETY: Xlib passes a valid event for the duration of the call
    let Some(error) = (unsafe { event.as_ref() }) else {
        return 0;
    };

    let hook = HOOK.read();
    let Some(hook) = hook.as_ref() else {
        return 0;
    };

    if let Some(fault) = classify(error.error_code, error.resourceid) {
        if hook.handle.report(fault).handled() {
            return 0;
        }
    }

    match hook.previous {
        // SAFETY: the previous handler was installed by Xlib or its owner for
        // exactly this signature
        Some(previous) => unsafe { previous(display, event) },
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use streamengine_core::Engine;
    use streamengine_core::testing::FakeGraph;

    use super::*;

    static PASSED_ON: AtomicUsize = AtomicUsize::new(0);

    #[allow(unsafe_code)]
    unsafe extern "C" fn count_passed_on(_: *mut xlib::Display, _: *mut xlib::XErrorEvent) -> c_int {
        PASSED_ON.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn x_error(error_code: c_uchar, resource: c_ulong) -> xlib::XErrorEvent {
        xlib::XErrorEvent {
            type_: 0,
            display: ptr::null_mut(),
            resourceid: resource,
            serial: 0,
            error_code,
            request_code: 0,
            minor_code: 0,
        }
    }

    #[test]
    fn test_error_codes_classified() {
        assert_eq!(classify(xlib::BadWindow, 0x10), Some(WindowFault::BadWindow(WindowId(0x10))));
        assert_eq!(classify(xlib::BadDrawable, 0x10), Some(WindowFault::BadDrawable(WindowId(0x10))));
        assert_eq!(classify(xlib::BadValue, 0x10), Some(WindowFault::BadValue(WindowId(0x10))));
        assert_eq!(classify(xlib::BadGC, 7), Some(WindowFault::BadGraphicsContext(7)));
        assert_eq!(classify(xlib::BadAccess, 0x10), None);
    }

    #[test]
    #[allow(unsafe_code)]
    fn test_bound_window_errors_reach_the_engine() {
        let mut engine = Engine::new(FakeGraph::new());
        engine.add_preview_window(WindowId(0x10)).unwrap();
        *HOOK.write() = Some(Hook { handle: engine.window_fault_handle(), previous: Some(count_passed_on) });
        let scheduled = engine.scheduler().scheduled();

        let mut bad_window = x_error(xlib::BadWindow, 0x10);
        // SAFETY: the event outlives the call and the display is never read
        unsafe { on_x_error(ptr::null_mut(), &raw mut bad_window) };
        assert_eq!(engine.scheduler().scheduled(), scheduled + 1);
        assert_eq!(PASSED_ON.load(Ordering::SeqCst), 0);

        let mut stranger = x_error(xlib::BadWindow, 0x99);
        unsafe { on_x_error(ptr::null_mut(), &raw mut stranger) };
        let mut unrelated = x_error(xlib::BadAccess, 0x10);
        unsafe { on_x_error(ptr::null_mut(), &raw mut unrelated) };
        assert_eq!(PASSED_ON.load(Ordering::SeqCst), 2);
        assert_eq!(engine.scheduler().scheduled(), scheduled + 1);

        *HOOK.write() = None;
    }
}
