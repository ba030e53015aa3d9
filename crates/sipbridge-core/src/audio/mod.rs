//! Audio device classification and route switching
//!
//! ```text
//! ┌─────────────────────┐  scan()   ┌─────────────────────┐
//! │   DeviceRegistry    │ ◀──────── │     AudioRouter     │
//! │ snapshot: current + │           │ switch_to(route)    │
//! │ options + reps      │ ────────▶ │ → engine setters    │
//! └─────────────────────┘           │ → audio session     │
//!                                   │ → re-scan           │
//!                                   └─────────────────────┘
//! ```

pub mod device;
pub mod registry;
pub mod router;
pub mod session;

pub use device::{AudioCapabilities, AudioDevice, DeviceCategory};
pub use registry::{DeviceRegistry, DeviceSnapshot, Representatives, RouteName, RouteOptions};
pub use router::AudioRouter;
pub use session::{AudioSessionConfigurator, AudioSessionError, AudioSessionMode, AudioSessionProfile, NoopAudioSession};
