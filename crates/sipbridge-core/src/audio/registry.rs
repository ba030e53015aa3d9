//! Device Registry
//!
//! Classifies the engine's audio devices into the three routable categories
//! (`phone`, `bluetooth`, `loudspeaker`) and infers which route is currently
//! active. The registry owns exactly one [`DeviceSnapshot`], replaced wholesale
//! on every scan.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::device::{AudioDevice, DeviceCategory};
use crate::engine::Engine;
use crate::error::{BridgeError, BridgeResult};

/// Named input/output pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteName {
    Phone,
    Bluetooth,
    Loudspeaker,
}

impl RouteName {
    pub const ALL: [RouteName; 3] = [RouteName::Phone, RouteName::Bluetooth, RouteName::Loudspeaker];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteName::Phone => "phone",
            RouteName::Bluetooth => "bluetooth",
            RouteName::Loudspeaker => "loudspeaker",
        }
    }
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteName {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(RouteName::Phone),
            "bluetooth" => Ok(RouteName::Bluetooth),
            "loudspeaker" => Ok(RouteName::Loudspeaker),
            other => Err(BridgeError::invalid_configuration("route", format!("unknown route {:?}", other))),
        }
    }
}

/// Route availability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RouteOptions {
    pub phone: bool,
    pub bluetooth: bool,
    pub loudspeaker: bool,
}

impl RouteOptions {
    pub fn is_available(&self, route: RouteName) -> bool {
        match route {
            RouteName::Phone => self.phone,
            RouteName::Bluetooth => self.bluetooth,
            RouteName::Loudspeaker => self.loudspeaker,
        }
    }

    /// Available routes in fallback order
    pub fn available(&self) -> impl Iterator<Item = RouteName> + '_ {
        [RouteName::Phone, RouteName::Loudspeaker, RouteName::Bluetooth]
            .into_iter()
            .filter(move |route| self.is_available(*route))
    }
}

/// First device seen per bucket, in engine enumeration order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Representatives {
    pub microphone: Option<AudioDevice>,
    pub earpiece: Option<AudioDevice>,
    pub loud_speaker: Option<AudioDevice>,
    pub loud_mic: Option<AudioDevice>,
    pub bluetooth_speaker: Option<AudioDevice>,
    pub bluetooth_mic: Option<AudioDevice>,
}

impl Representatives {
    /// Bucket devices by category; within `Speaker` and `Bluetooth`, devices
    /// that can play are the output representative and the rest the input.
    pub fn classify<'a>(devices: impl IntoIterator<Item = &'a AudioDevice>) -> Self {
        let mut reps = Self::default();
        for device in devices {
            let bucket = match device.category {
                DeviceCategory::Microphone => &mut reps.microphone,
                DeviceCategory::Earpiece => &mut reps.earpiece,
                DeviceCategory::Speaker if device.can_play() => &mut reps.loud_speaker,
                DeviceCategory::Speaker => &mut reps.loud_mic,
                DeviceCategory::Bluetooth if device.can_play() => &mut reps.bluetooth_speaker,
                DeviceCategory::Bluetooth => &mut reps.bluetooth_mic,
                DeviceCategory::Other => continue,
            };
            if bucket.is_none() {
                *bucket = Some(device.clone());
            } else {
                debug!(device = %device, "Discarding duplicate audio device");
            }
        }
        reps
    }

    pub fn options(&self) -> RouteOptions {
        RouteOptions {
            phone: self.microphone.is_some(),
            bluetooth: self.bluetooth_mic.is_some() || self.bluetooth_speaker.is_some(),
            loudspeaker: self.loud_speaker.is_some(),
        }
    }
}

/// Result of one device scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub current: RouteName,
    pub options: RouteOptions,
    #[serde(skip)]
    pub representatives: Representatives,
}

impl DeviceSnapshot {
    /// Build a snapshot from an enumeration and the engine's active devices
    ///
    /// The current route follows Bluetooth > Loudspeaker > Phone and is always
    /// one of the available routes. Fails with [`BridgeError::NoAudioRoute`]
    /// when no route is available at all.
    pub fn classify(
        devices: &[AudioDevice],
        input: Option<&AudioDevice>,
        output: Option<&AudioDevice>,
    ) -> BridgeResult<Self> {
        let representatives = Representatives::classify(devices);
        let options = representatives.options();

        let on_bluetooth = input.map_or(false, AudioDevice::is_bluetooth)
            || output.map_or(false, AudioDevice::is_bluetooth);
        let on_speaker = output.map_or(false, |d| d.category == DeviceCategory::Speaker);

        let inferred = if on_bluetooth {
            RouteName::Bluetooth
        } else if on_speaker {
            RouteName::Loudspeaker
        } else {
            RouteName::Phone
        };

        let current = if options.is_available(inferred) {
            inferred
        } else {
            let fallback = options.available().next().ok_or(BridgeError::NoAudioRoute)?;
            debug!(inferred = %inferred, fallback = %fallback, "Active route not available, reporting fallback");
            fallback
        };

        Ok(Self {
            current,
            options,
            representatives,
        })
    }
}

/// Owner of the latest device snapshot
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    snapshot: Option<DeviceSnapshot>,
    scans: u64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate devices and replace the snapshot
    ///
    /// `engine` is `None` while the engine has not been initialised.
    pub fn scan(&mut self, engine: Option<&dyn Engine>) -> BridgeResult<DeviceSnapshot> {
        let engine = engine.ok_or(BridgeError::EngineUnavailable)?;
        let devices = engine.audio_devices()?;
        let input = engine.input_device();
        let output = engine.output_device();

        let snapshot = DeviceSnapshot::classify(&devices, input.as_ref(), output.as_ref())?;
        self.scans += 1;
        debug!(
            devices = devices.len(),
            current = %snapshot.current,
            options = ?snapshot.options,
            "Audio device scan complete"
        );
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// The last successful scan, if any
    pub fn snapshot(&self) -> Option<&DeviceSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::AudioCapabilities;

    fn device(id: &str, category: DeviceCategory, caps: AudioCapabilities) -> AudioDevice {
        AudioDevice::new(id, id, category, caps)
    }

    #[test]
    fn test_speaker_and_bluetooth_classification() {
        let devices = vec![
            device("spk-play", DeviceCategory::Speaker, AudioCapabilities::PLAY),
            device("spk-rec", DeviceCategory::Speaker, AudioCapabilities::RECORD),
            device("bt-play", DeviceCategory::Bluetooth, AudioCapabilities::PLAY),
        ];

        let snapshot = DeviceSnapshot::classify(&devices, None, Some(&devices[0])).unwrap();
        assert_eq!(
            snapshot.options,
            RouteOptions { phone: false, bluetooth: true, loudspeaker: true }
        );
        assert_eq!(snapshot.current, RouteName::Loudspeaker);
        assert_eq!(snapshot.representatives.loud_mic.as_ref().unwrap().id, "spk-rec");
        assert_eq!(snapshot.representatives.bluetooth_speaker.as_ref().unwrap().id, "bt-play");
        assert!(snapshot.representatives.bluetooth_mic.is_none());
    }

    #[test]
    fn test_first_device_per_bucket_wins() {
        let devices = vec![
            device("mic-1", DeviceCategory::Microphone, AudioCapabilities::RECORD),
            device("mic-2", DeviceCategory::Microphone, AudioCapabilities::RECORD),
            device("spk-1", DeviceCategory::Speaker, AudioCapabilities::PLAY),
            device("spk-2", DeviceCategory::Speaker, AudioCapabilities::PLAY_RECORD),
        ];
        let reps = Representatives::classify(&devices);
        assert_eq!(reps.microphone.unwrap().id, "mic-1");
        assert_eq!(reps.loud_speaker.unwrap().id, "spk-1");
        assert!(reps.loud_mic.is_none());
    }

    #[test]
    fn test_current_route_precedence() {
        let mic = device("mic", DeviceCategory::Microphone, AudioCapabilities::RECORD);
        let ear = device("ear", DeviceCategory::Earpiece, AudioCapabilities::PLAY);
        let spk = device("spk", DeviceCategory::Speaker, AudioCapabilities::PLAY);
        let bt = device("bt", DeviceCategory::Bluetooth, AudioCapabilities::PLAY_RECORD);
        let devices = vec![mic.clone(), ear.clone(), spk.clone(), bt.clone()];

        // Bluetooth input wins over a speaker output
        let snapshot = DeviceSnapshot::classify(&devices, Some(&bt), Some(&spk)).unwrap();
        assert_eq!(snapshot.current, RouteName::Bluetooth);

        let snapshot = DeviceSnapshot::classify(&devices, Some(&mic), Some(&spk)).unwrap();
        assert_eq!(snapshot.current, RouteName::Loudspeaker);

        let snapshot = DeviceSnapshot::classify(&devices, Some(&mic), Some(&ear)).unwrap();
        assert_eq!(snapshot.current, RouteName::Phone);

        let snapshot = DeviceSnapshot::classify(&devices, None, None).unwrap();
        assert_eq!(snapshot.current, RouteName::Phone);
    }

    #[test]
    fn test_current_is_always_available() {
        // Only a Bluetooth headset is enumerated while the engine still points
        // at a built-in earpiece.
        let bt = device("bt", DeviceCategory::Bluetooth, AudioCapabilities::PLAY);
        let ear = device("ear", DeviceCategory::Earpiece, AudioCapabilities::PLAY);
        let snapshot = DeviceSnapshot::classify(&[bt], None, Some(&ear)).unwrap();
        assert_eq!(snapshot.current, RouteName::Bluetooth);
        assert!(snapshot.options.is_available(snapshot.current));
    }

    #[test]
    fn test_no_routable_device() {
        let other = device("hdmi", DeviceCategory::Other, AudioCapabilities::PLAY);
        let err = DeviceSnapshot::classify(&[other], None, None).unwrap_err();
        assert_eq!(err, BridgeError::NoAudioRoute);
    }

    #[test]
    fn test_scan_requires_engine() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.scan(None).unwrap_err(), BridgeError::EngineUnavailable);
        assert!(registry.snapshot().is_none());
        assert_eq!(registry.scan_count(), 0);
    }

    #[test]
    fn test_snapshot_serializes_bridge_shape() {
        let mic = device("mic", DeviceCategory::Microphone, AudioCapabilities::RECORD);
        let snapshot = DeviceSnapshot::classify(&[mic], None, None).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "current": "phone",
                "options": { "phone": true, "bluetooth": false, "loudspeaker": false }
            })
        );
    }

    #[test]
    fn test_route_name_round_trip_through_str() {
        for route in RouteName::ALL {
            assert_eq!(route.as_str().parse::<RouteName>().unwrap(), route);
        }
        assert!("speaker".parse::<RouteName>().is_err());
    }
}
