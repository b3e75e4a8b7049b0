// Interception registry
//
// Records which platform entry points have been wrapped so installing twice
// never stacks wrappers. Device entry points are tracked here; the transport
// factory additionally carries its own marker (`is_injecting`) so a factory
// that was wrapped elsewhere is also recognised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use colored::*;
use tracing::{debug, info};

use crate::activation::ActivationState;
use crate::audio::graph::GraphManager;
use crate::error::Result;
use crate::media::constraints::MediaStreamConstraints;
use crate::media::devices::{MediaDeviceInfo, MediaDevices, VirtualMediaDevices};
use crate::media::track::MediaStream;
use crate::transport::{InjectingPeerConnectionFactory, PeerConnectionFactory, TrackInjector};

/// Result of an install attempt: the wrapper, or the original handed back
#[derive(Debug)]
pub enum Installation<W, F> {
    Wrapped(W),
    Skipped(F),
}

impl<W, F> Installation<W, F> {
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Installation::Wrapped(_))
    }

    pub fn wrapped(self) -> Option<W> {
        match self {
            Installation::Wrapped(w) => Some(w),
            Installation::Skipped(_) => None,
        }
    }
}

#[async_trait]
impl<W: MediaDevices, F: MediaDevices> MediaDevices for Installation<W, F> {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        match self {
            Installation::Wrapped(w) => w.enumerate_devices().await,
            Installation::Skipped(f) => f.enumerate_devices().await,
        }
    }

    async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream> {
        match self {
            Installation::Wrapped(w) => w.get_user_media(constraints).await,
            Installation::Skipped(f) => f.get_user_media(constraints).await,
        }
    }
}

#[derive(Debug, Default)]
pub struct InterceptionRegistry {
    enumeration: AtomicBool,
    acquisition: AtomicBool,
    transport: AtomicBool,
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enumeration_wrapped(&self) -> bool {
        self.enumeration.load(Ordering::Acquire)
    }

    pub fn acquisition_wrapped(&self) -> bool {
        self.acquisition.load(Ordering::Acquire)
    }

    pub fn transport_wrapped(&self) -> bool {
        self.transport.load(Ordering::Acquire)
    }

    /// Wrap enumeration and acquisition together. A second call returns the
    /// devices unchanged.
    pub fn install_media_devices<D: MediaDevices>(
        &self,
        devices: D,
        graph: Arc<GraphManager>,
        activation: Arc<ActivationState>,
    ) -> Installation<VirtualMediaDevices<D>, D> {
        let first_enum = !self.enumeration.swap(true, Ordering::AcqRel);
        let first_acq = !self.acquisition.swap(true, Ordering::AcqRel);
        if !(first_enum && first_acq) {
            debug!("Media devices already intercepted, leaving as is");
            return Installation::Skipped(devices);
        }
        info!("{}: device enumeration and acquisition wrapped", "INTERCEPT".green());
        Installation::Wrapped(VirtualMediaDevices::new(devices, graph, activation))
    }

    /// Wrap a peer-connection factory unless it (or this registry) already
    /// injects.
    pub fn install_transport<F: PeerConnectionFactory>(
        &self,
        factory: F,
        injector: TrackInjector,
    ) -> Installation<InjectingPeerConnectionFactory<F>, F> {
        if factory.is_injecting() {
            self.transport.store(true, Ordering::Release);
            debug!("Peer-connection factory already injecting");
            return Installation::Skipped(factory);
        }
        if self.transport.swap(true, Ordering::AcqRel) {
            debug!("Transport already intercepted, leaving factory as is");
            return Installation::Skipped(factory);
        }
        info!("{}: peer-connection transport wrapped", "INTERCEPT".green());
        Installation::Wrapped(InjectingPeerConnectionFactory::new(factory, injector))
    }
}
