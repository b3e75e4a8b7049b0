// Acquisition constraints as hosts pass them
//
// `audio` may be a boolean, a bare device id, a track constraint set or an
// array of sets. Device ids may be a string, a list, or `{exact, ideal}` with
// either form inside. Boolean and numeric members accept the bare value or
// the `{exact, ideal}` object (numbers also `{min, max}`). Shapes that match
// none of these still parse, so they can be delegated untouched.

use serde::{Deserialize, Serialize};

/// A string or list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            StringList::One(s) => s == value,
            StringList::Many(list) => list.iter().any(|s| s == value),
        }
    }
}

/// `deviceId` member of a track constraint set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstrainDomString {
    Value(StringList),
    Params {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exact: Option<StringList>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ideal: Option<StringList>,
    },
}

impl ConstrainDomString {
    pub fn exact(id: &str) -> Self {
        ConstrainDomString::Params {
            exact: Some(StringList::One(id.to_string())),
            ideal: None,
        }
    }

    pub fn ideal(id: &str) -> Self {
        ConstrainDomString::Params {
            exact: None,
            ideal: Some(StringList::One(id.to_string())),
        }
    }

    pub fn mentions(&self, id: &str) -> bool {
        match self {
            ConstrainDomString::Value(list) => list.contains(id),
            ConstrainDomString::Params { exact, ideal } => {
                exact.as_ref().is_some_and(|l| l.contains(id))
                    || ideal.as_ref().is_some_and(|l| l.contains(id))
            }
        }
    }
}

/// Boolean member such as `echoCancellation`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstrainBoolean {
    Value(bool),
    Params {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ideal: Option<bool>,
    },
}

/// Integer member such as `channelCount` or `sampleRate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstrainULong {
    Value(u32),
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exact: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ideal: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
    },
}

/// Track-level audio constraints. Unknown members are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrackConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<ConstrainDomString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_cancellation: Option<ConstrainBoolean>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_suppression: Option<ConstrainBoolean>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_gain_control: Option<ConstrainBoolean>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<ConstrainULong>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<ConstrainULong>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudioConstraints {
    Enabled(bool),
    DeviceId(String),
    Sets(Vec<AudioConstraints>),
    Track(AudioTrackConstraints),
    /// Any other shape, kept verbatim
    Other(serde_json::Value),
}

impl AudioConstraints {
    pub fn device(id: ConstrainDomString) -> Self {
        AudioConstraints::Track(AudioTrackConstraints {
            device_id: Some(id),
            ..Default::default()
        })
    }

    /// Truthiness of the `audio` member
    pub fn requests_audio(&self) -> bool {
        match self {
            AudioConstraints::Enabled(enabled) => *enabled,
            AudioConstraints::DeviceId(id) => !id.is_empty(),
            AudioConstraints::Sets(_) | AudioConstraints::Track(_) => true,
            AudioConstraints::Other(value) => crate::control::is_truthy(value),
        }
    }

    pub fn names_device(&self, id: &str) -> bool {
        match self {
            AudioConstraints::Enabled(_) => false,
            AudioConstraints::DeviceId(requested) => requested == id,
            AudioConstraints::Sets(sets) => sets.iter().any(|set| set.names_device(id)),
            AudioConstraints::Track(track) => track.device_id.as_ref().is_some_and(|d| d.mentions(id)),
            AudioConstraints::Other(value) => value_names_device(value, id),
        }
    }
}

/// `deviceId` lookup on a set whose other members did not type-check
fn value_names_device(value: &serde_json::Value, id: &str) -> bool {
    match value {
        serde_json::Value::Array(sets) => sets.iter().any(|set| value_names_device(set, id)),
        serde_json::Value::Object(members) => members
            .get("deviceId")
            .and_then(|d| serde_json::from_value::<ConstrainDomString>(d.clone()).ok())
            .is_some_and(|d| d.mentions(id)),
        _ => false,
    }
}

/// Argument to device acquisition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaStreamConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<serde_json::Value>,
}

impl MediaStreamConstraints {
    pub fn audio(audio: AudioConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: None,
        }
    }

    pub fn video_only() -> Self {
        Self {
            audio: None,
            video: Some(serde_json::Value::Bool(true)),
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn wants_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(AudioConstraints::requests_audio)
    }

    /// Whether the request explicitly names `device_id` in any accepted form
    pub fn wants_virtual_mic(&self, device_id: &str) -> bool {
        self.audio.as_ref().is_some_and(|a| a.names_device(device_id))
    }
}
