// Execution context and the platform seam behind it
//
// The host platform decides whether an audio context may be created, whether
// it may start running (autoplay / gesture policy) and whether the rendering
// unit module can be loaded. Everything else about the graph is ours.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use colored::*;
use tracing::{info, warn};

use crate::error::{MicError, Result};

/// Host hooks the audio context depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioPlatform: Send + Sync {
    /// Construct the platform context at the given rate
    fn create_context(&self, sample_rate: u32) -> Result<()>;

    /// Ask the platform to start the context; rejected until a user gesture
    async fn resume_context(&self) -> Result<()>;

    /// Load the rendering unit module from `specifier` (absolute URL or
    /// page-relative path)
    async fn load_module(&self, specifier: &str) -> Result<()>;
}

/// Platform that allows everything; used when no host hooks are supplied
#[derive(Debug, Default, Clone)]
pub struct HeadlessPlatform;

#[async_trait]
impl AudioPlatform for HeadlessPlatform {
    fn create_context(&self, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    async fn resume_context(&self) -> Result<()> {
        Ok(())
    }

    async fn load_module(&self, _specifier: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The single execution context of a graph
#[derive(Debug)]
pub struct AudioContext {
    id: u64,
    sample_rate: u32,
    state: Mutex<ContextState>,
    frames_rendered: AtomicU64,
}

impl AudioContext {
    pub fn create(platform: &dyn AudioPlatform, sample_rate: u32) -> Result<Self> {
        platform.create_context(sample_rate)?;
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            "{}: context {} created at {} Hz (suspended)",
            "CONTEXT_CREATE".green(),
            id,
            sample_rate
        );
        Ok(Self {
            id,
            sample_rate,
            state: Mutex::new(ContextState::Suspended),
            frames_rendered: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ContextState::Suspended)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    /// Resume through the platform. A rejection leaves the context suspended.
    pub async fn resume(&self, platform: &dyn AudioPlatform) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        match platform.resume_context().await {
            Ok(()) => {
                if let Ok(mut state) = self.state.lock() {
                    *state = ContextState::Running;
                }
                info!("{}: context {} running", "CONTEXT_RESUME".green(), self.id);
                Ok(())
            }
            Err(e) => {
                warn!("{}: context {} resume rejected: {}", "CONTEXT_RESUME".yellow(), self.id, e);
                Err(match e {
                    MicError::ResumeRejected(_) => e,
                    other => MicError::ResumeRejected(other.to_string()),
                })
            }
        }
    }

    pub(crate) fn advance(&self, frames: usize) {
        self.frames_rendered.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Seconds of audio rendered so far
    pub fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }
}
