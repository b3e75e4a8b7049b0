// Audio module - the virtual microphone's processing graph
//
// - types: frame and render-port message types
// - conversion: sample format conversion for inbound frames
// - context: execution context and the platform seam
// - nodes: gains, oscillators, keep-alive and fallback bursts
// - analyzer: frequency analysis tap
// - renderer: the rendering unit and its message port
// - taps: capture destination and local monitor output
// - graph: lazy, idempotent graph construction and rendering
// - ingest: frame ingestion with pre-activation queuing
// - driver: realtime render thread

pub mod analyzer;
pub mod context;
pub mod conversion;
pub mod driver;
pub mod graph;
pub mod ingest;
pub mod nodes;
pub mod renderer;
pub mod taps;
pub mod types;

pub use analyzer::AnalyserNode;
pub use context::{AudioContext, AudioPlatform, ContextState, HeadlessPlatform};
pub use conversion::{convert_f32_to_i16, f32_to_i16, frame_to_pcm16};
pub use driver::RenderDriver;
pub use graph::{GraphManager, GraphState, GraphStats};
pub use ingest::{FrameIngestor, PendingFrameQueue};
pub use renderer::{PcmRenderer, RenderPort};
pub use taps::{MediaStreamDestination, MonitorTap};
pub use types::{AudioFrame, RenderMessage, SampleFormat};
