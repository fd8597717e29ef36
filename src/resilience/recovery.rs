//! Per-request fault boundary.
//!
//! # State
//! ```text
//! run_guarded(f):
//!     depth += 1            (hook now records instead of printing)
//!     catch_unwind(f)
//!     depth -= 1
//!     Ok(Err(e)) → Failure::Handler(e)
//!     Err(panic) → Failure::Fault { message, trace captured at panic site }
//! ```
//!
//! The panic hook is process-wide and installed once. Outside a boundary it
//! defers to whatever hook was installed before it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::error::AppError;
use crate::resilience::classify::{Failure, Fault};

thread_local! {
    static BOUNDARY_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if BOUNDARY_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let trace = format!("panicked at {}\n{}", location, Backtrace::force_capture());
            LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
        }));
    });
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        BOUNDARY_DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        BOUNDARY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Run `f`, turning both its error and any panic into a [`Failure`].
pub fn run_guarded<T, F>(f: F) -> Result<T, Failure>
where
    F: FnOnce() -> Result<T, AppError>,
{
    install_hook();
    LAST_TRACE.with(|slot| slot.borrow_mut().take());

    let outcome = {
        let _depth = DepthGuard::enter();
        panic::catch_unwind(AssertUnwindSafe(f))
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Failure::Handler(err)),
        Err(payload) => {
            let trace = fault_trace(LAST_TRACE.with(|slot| slot.borrow_mut().take()));
            Err(Failure::Fault(Fault {
                message: panic_message(payload.as_ref()),
                trace,
            }))
        }
    }
}

/// The trace recorded at the panic site, or one captured here when another
/// hook replaced ours and nothing was recorded.
fn fault_trace(recorded: Option<String>) -> String {
    match recorded {
        Some(trace) if !trace.is_empty() => trace,
        _ => format!("caught at fault boundary\n{}", Backtrace::force_capture()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
