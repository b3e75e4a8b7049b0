// Realtime render thread for hosts without their own audio callback

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use colored::*;
use tracing::{info, warn};

use super::graph::GraphManager;
use crate::config::RENDER_QUANTUM_FRAMES;

/// Drives `render_quantum` at the context's real-time rate on its own thread
pub struct RenderDriver {
    running: Arc<AtomicBool>,
    quanta: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl RenderDriver {
    pub fn spawn(graph: Arc<GraphManager>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let quanta = Arc::new(AtomicU64::new(0));
        let period = Duration::from_secs_f64(
            RENDER_QUANTUM_FRAMES as f64 / graph.config().sample_rate as f64,
        );

        let thread_running = running.clone();
        let thread_quanta = quanta.clone();
        let handle = std::thread::Builder::new()
            .name("voicehub-render".into())
            .spawn(move || {
                info!("{}: render thread started ({:?} per quantum)", "RENDER_DRIVER".green(), period);
                let mut next = Instant::now();
                while thread_running.load(Ordering::Acquire) {
                    if graph.render_quantum().is_some() {
                        thread_quanta.fetch_add(1, Ordering::Relaxed);
                    }
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        // Fell behind; resync rather than burst to catch up
                        next = now;
                    }
                }
                info!("{}: render thread stopped", "RENDER_DRIVER".green());
            })?;

        Ok(Self {
            running,
            quanta,
            handle: Some(handle),
        })
    }

    /// Quanta rendered while the context was running
    pub fn quanta_rendered(&self) -> u64 {
        self.quanta.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Render thread panicked");
            }
        }
    }
}

impl Drop for RenderDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::context::HeadlessPlatform;
    use crate::config::MicConfig;

    #[tokio::test]
    async fn test_driver_renders_once_running() {
        let graph = Arc::new(GraphManager::new(MicConfig::default(), Arc::new(HeadlessPlatform)));
        let state = graph.ensure_graph().await.expect("graph");
        state.context.resume(graph.platform().as_ref()).await.expect("resume");

        let mut driver = RenderDriver::spawn(graph.clone()).expect("spawn");
        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.stop();

        assert!(driver.quanta_rendered() > 0);
        assert!(state.context.current_time() > 0.0);
    }
}
