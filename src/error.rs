// Error types for the virtual microphone engine
//
// Every platform call made by the engine returns one of these. Callers inside
// the engine log and degrade; nothing here is ever surfaced to the host page.

/// Errors that can occur while driving the virtual microphone
#[derive(Debug, thiserror::Error)]
pub enum MicError {
    #[error("Audio context could not be created: {0}")]
    ContextCreation(String),

    #[error("Audio context resume rejected: {0}")]
    ResumeRejected(String),

    #[error("Rendering unit module failed to load from {url}: {reason}")]
    ModuleLoad { url: String, reason: String },

    #[error("Audio graph not constructed")]
    GraphUnavailable,

    #[error("Track has ended: {track_id}")]
    TrackEnded { track_id: String },

    #[error("Constraint not satisfiable: {0}")]
    Constraint(String),

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Display frame scheduler unavailable")]
    SchedulerUnavailable,

    #[error("Platform error: {0}")]
    Platform(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MicError>;
