// Media module - tracks, streams and the device surface
//
// - track: tracks, streams and their shared sources
// - constraints: acquisition constraint forms
// - devices: enumeration/acquisition and the virtualizing wrapper

pub mod constraints;
pub mod devices;
pub mod track;

pub use constraints::{AudioConstraints, AudioTrackConstraints, ConstrainDomString, MediaStreamConstraints, StringList};
pub use devices::{MediaDeviceInfo, MediaDeviceKind, MediaDevices, VirtualMediaDevices};
pub use track::{AudioProcessingSettings, ContentHint, MediaStream, MediaStreamTrack, TrackKind, TrackSource};
