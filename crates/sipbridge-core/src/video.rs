//! Video surface attachment
//!
//! The UI layer owns the drawable. It hands a platform-native handle to a
//! [`VideoSurfaceSlot`] whenever the view is laid out; the coordinator reads
//! the slot when asked to set up video. An empty slot means "not ready yet"
//! and callers are expected to retry.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Opaque platform-native drawable handle (window, layer or view pointer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoSurfaceHandle(pub u64);

impl fmt::Display for VideoSurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{:#x}", self.0)
    }
}

/// Shared slot the UI fills once its view exists
#[derive(Debug, Clone, Default)]
pub struct VideoSurfaceSlot {
    handle: Arc<RwLock<Option<VideoSurfaceHandle>>>,
}

impl VideoSurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the UI layer when its drawable becomes available
    pub fn provide(&self, handle: VideoSurfaceHandle) {
        *self.handle.write() = Some(handle);
    }

    /// Called by the UI layer when the view is torn down
    pub fn withdraw(&self) -> Option<VideoSurfaceHandle> {
        self.handle.write().take()
    }

    pub fn get(&self) -> Option<VideoSurfaceHandle> {
        *self.handle.read()
    }
}

/// Still picture used as the outgoing video source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticImageSource {
    pub image_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

impl StaticImageSource {
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            fps: None,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.image_path.trim().is_empty() {
            return Err(BridgeError::InvalidStaticImage {
                reason: "image path is empty".to_string(),
            });
        }
        if self.fps == Some(0) {
            return Err(BridgeError::InvalidStaticImage {
                reason: "fps must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_is_shared_between_clones() {
        let ui_side = VideoSurfaceSlot::new();
        let core_side = ui_side.clone();
        assert_eq!(core_side.get(), None);

        ui_side.provide(VideoSurfaceHandle(0xdead));
        assert_eq!(core_side.get(), Some(VideoSurfaceHandle(0xdead)));

        assert_eq!(ui_side.withdraw(), Some(VideoSurfaceHandle(0xdead)));
        assert_eq!(core_side.get(), None);
    }

    #[test]
    fn test_static_image_validation() {
        assert!(StaticImageSource::new("/tmp/nowebcam.jpg").validate().is_ok());
        assert!(StaticImageSource::new("/tmp/nowebcam.jpg").with_fps(5).validate().is_ok());
        assert!(matches!(
            StaticImageSource::new("  ").validate(),
            Err(BridgeError::InvalidStaticImage { .. })
        ));
        assert!(matches!(
            StaticImageSource::new("/tmp/a.jpg").with_fps(0).validate(),
            Err(BridgeError::InvalidStaticImage { .. })
        ));
    }

    #[test]
    fn test_static_image_json_shape() {
        let source: StaticImageSource = serde_json::from_str(r#"{"imagePath":"/img.png","fps":2}"#).unwrap();
        assert_eq!(source, StaticImageSource::new("/img.png").with_fps(2));
    }
}
