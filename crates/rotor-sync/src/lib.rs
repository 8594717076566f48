//! Blocking synchronization primitives for the rotor admission controller.
//!
//! The controller's protocol needs a combination no off-the-shelf lock
//! provides:
//!
//! - permits released in batches *before* any waiter resumes ([`Semaphore`]);
//! - a binary gate whose permit can be released by a thread other than the
//!   one that acquired it, with strict FIFO acquisition ([`FairSemaphore`]);
//! - cooperative cancellation that wakes a parked waiter without consuming
//!   a permit raised on its behalf ([`CancelToken`]).
//!
//! All primitives are classical blocking constructions over
//! `parking_lot::{Mutex, Condvar}`; there are no lock-free tricks here.

pub mod cancel;
pub mod fair;
pub mod semaphore;

pub use cancel::CancelToken;
pub use fair::FairSemaphore;
pub use semaphore::Semaphore;
