pub mod device;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod native;
pub mod session;
pub mod tracking;

pub use device::{DeviceDriver, DeviceEvent, GlassesEventType};
pub use dispatch::main_thread::MainThreadQueue;
pub use dispatch::{AsyncTaskExecutor, DispatchError, RaceOutcome, TimeoutRace};
pub use error::{ErrorReport, KernalError, KernelResult, Severity};
pub use native::translate::NativeResultTranslator;
pub use session::{SessionManager, SessionState};
pub use tracking::{TrackingDriver, TrackingType};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, taking the data back if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
