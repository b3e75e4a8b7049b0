// Visualization loop
//
// Once started the loop never stops: every display frame it samples the
// analyser, folds the spectrum into a fixed number of buckets and broadcasts
// them as a `viz` status. Hosts without a display-frame scheduler (or whose
// scheduler errors) tick on a fixed interval instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colored::*;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::graph::GraphManager;
use crate::error::Result;
use crate::mic_debug;
use crate::status::{StatusBroadcaster, StatusPayload};

/// Display-frame clock supplied by the host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameScheduler: Send + Sync {
    /// Completes at the next display frame
    async fn next_frame(&self) -> Result<()>;
}

/// Average contiguous runs of `data` into `bins` values, rounding to nearest.
/// Buckets past the end of the data are zero.
pub fn bucketize(data: &[u8], bins: usize) -> Vec<u8> {
    if bins == 0 {
        return Vec::new();
    }
    let step = (data.len() / bins).max(1);
    (0..bins)
        .map(|i| {
            let start = (i * step).min(data.len());
            let end = ((i + 1) * step).min(data.len());
            let slice = &data[start..end];
            if slice.is_empty() {
                0
            } else {
                let sum: u32 = slice.iter().map(|&v| u32::from(v)).sum();
                (sum as f64 / slice.len() as f64).round() as u8
            }
        })
        .collect()
}

pub struct VisualizationLoop {
    graph: Arc<GraphManager>,
    status: StatusBroadcaster,
    scheduler: Option<Arc<dyn FrameScheduler>>,
    fallback_interval: Duration,
    bins: usize,
    started: AtomicBool,
    ticks: AtomicU64,
}

impl VisualizationLoop {
    pub fn new(
        graph: Arc<GraphManager>,
        status: StatusBroadcaster,
        scheduler: Option<Arc<dyn FrameScheduler>>,
    ) -> Self {
        let fallback_interval = graph.config().fallback_tick_interval();
        let bins = graph.config().visualization_bins;
        Self {
            graph,
            status,
            scheduler,
            fallback_interval,
            bins,
            started: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Sample the analyser once. `None` until the graph has an analyser.
    pub fn tick(&self) -> Option<Vec<u8>> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let analyser = self.graph.peek()?.analyser?;
        let mut spectrum = vec![0u8; analyser.frequency_bin_count()];
        analyser.get_byte_frequency_data(&mut spectrum);
        let viz = bucketize(&spectrum, self.bins);
        self.status.emit(StatusPayload::viz(viz.clone()));
        Some(viz)
    }

    /// Spawn the loop on the current runtime; later calls are no-ops
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        info!(
            "{}: visualization loop started ({} buckets)",
            "VIZ_LOOP".green(),
            self.bins
        );
        Some(tokio::spawn(self.clone().run()))
    }

    async fn run(self: Arc<Self>) {
        let mut warned = false;
        loop {
            self.tick();
            let scheduled = match &self.scheduler {
                Some(scheduler) => scheduler.next_frame().await,
                None => Err(crate::error::MicError::SchedulerUnavailable),
            };
            if let Err(e) = scheduled {
                if !warned {
                    warn!("{}: {}, ticking every {:?}", "VIZ_LOOP".yellow(), e, self.fallback_interval);
                    warned = true;
                }
                mic_debug!("Fallback visualization tick");
                tokio::time::sleep(self.fallback_interval).await;
            }
        }
    }
}

impl std::fmt::Debug for VisualizationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizationLoop")
            .field("started", &self.is_started())
            .field("ticks", &self.ticks())
            .finish()
    }
}
