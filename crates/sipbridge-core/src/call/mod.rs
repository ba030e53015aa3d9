//! Call Session
//!
//! One call at a time. The session is created when an INVITE is sent or
//! received and cleared when the engine reports `Released`.

pub mod control;
pub mod dtmf;
pub mod session;
pub mod state;

pub use control::CallController;
pub use dtmf::DtmfDigit;
pub use session::{CallDirection, CallId, CallInfo, CallSession};
pub use state::{CallState, Transition};
