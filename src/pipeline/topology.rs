//! Processing graph construction.
//!
//! ```text
//! capture -> splitter -> queue -> convert -> analysis -> csv sink     (always)
//!               |
//!               +------> queue -> convert -> wav encoder -> wav sink  (optional)
//! ```
//!
//! The capture → splitter link carries the only format filter; it pins the
//! sample rate and channel count the capture node has to deliver.

use crate::config::CaptureConfig;
use crate::defaults;
use crate::engine::{FormatFilter, GraphEngine, NodeId, NodeKind, PropertyValue};
use crate::error::Result;
use crate::pipeline::factory::NodeFactory;
use tracing::info;

/// Property names used while building the graph.
pub mod props {
    pub const DEVICE: &str = "device";
    pub const DITHERING: &str = "dithering";
    pub const REFERENCE_CHANNEL: &str = "reference-channel";
    pub const PEAK_THRESHOLD: &str = "peak-threshold";
    pub const PULSE_LENGTH: &str = "pulse-length";
    pub const WINDOW_SIZE: &str = "window-size";
    pub const OMIT_OUTPUT_IF_NO_PEAKS: &str = "omit-output-if-no-peaks";
    pub const UNDETECTED_PEAK_HANDLING: &str = "undetected-peak-handling";
    pub const UNDETECTED_PEAK_FILL_VALUE: &str = "undetected-peak-fill-value";
    pub const LOCATION: &str = "location";
    pub const ASYNC: &str = "async";
    pub const BUFFER_MODE: &str = "buffer-mode";
}

/// Node names, one per role.
pub mod roles {
    pub const CAPTURE: &str = "pulsesrc";
    pub const SPLITTER: &str = "tee";
    pub const CSV_QUEUE: &str = "csv_queue";
    pub const CSV_CONVERT: &str = "csv_audioconvert";
    pub const CSV_ANALYSIS: &str = "csv_driftmeasure";
    pub const CSV_SINK: &str = "csv_filesink";
    pub const WAV_QUEUE: &str = "wav_queue";
    pub const WAV_CONVERT: &str = "wav_audioconvert";
    pub const WAV_ENCODER: &str = "wav_wavenc";
    pub const WAV_SINK: &str = "wav_filesink";
}

/// Nodes of the mandatory analysis branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisBranch {
    pub queue: NodeId,
    pub convert: NodeId,
    pub analysis: NodeId,
    pub sink: NodeId,
}

/// Nodes of the optional raw-recording branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingBranch {
    pub queue: NodeId,
    pub convert: NodeId,
    pub encoder: NodeId,
    pub sink: NodeId,
}

/// A fully linked and configured processing graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub capture: NodeId,
    pub splitter: NodeId,
    pub analysis: AnalysisBranch,
    pub recording: Option<RecordingBranch>,
}

impl Topology {
    /// Number of branches hanging off the splitter.
    pub fn branch_count(&self) -> usize {
        1 + usize::from(self.recording.is_some())
    }
}

/// Builds a [`Topology`] from a validated [`CaptureConfig`].
pub struct TopologyBuilder<'a> {
    config: &'a CaptureConfig,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(config: &'a CaptureConfig) -> Self {
        Self { config }
    }

    /// Every node the configured graph needs, with its role.
    pub fn required_nodes(&self) -> Vec<(NodeKind, &'static str)> {
        let mut nodes = vec![
            (NodeKind::CaptureSource, roles::CAPTURE),
            (NodeKind::Splitter, roles::SPLITTER),
            (NodeKind::BufferStage, roles::CSV_QUEUE),
            (NodeKind::FormatStage, roles::CSV_CONVERT),
            (NodeKind::AnalysisNode, roles::CSV_ANALYSIS),
            (NodeKind::FileSink, roles::CSV_SINK),
        ];
        if self.config.output_wav_path().is_some() {
            nodes.extend([
                (NodeKind::BufferStage, roles::WAV_QUEUE),
                (NodeKind::FormatStage, roles::WAV_CONVERT),
                (NodeKind::ContainerEncoder, roles::WAV_ENCODER),
                (NodeKind::FileSink, roles::WAV_SINK),
            ]);
        }
        nodes
    }

    /// Format constraint for the capture → splitter link.
    pub fn capture_filter(&self) -> FormatFilter {
        FormatFilter {
            media_type: defaults::RAW_AUDIO_MEDIA_TYPE,
            rate: self.config.sample_rate_hz(),
            channels: self.config.num_channels(),
        }
    }

    /// Build the graph on `engine`.
    ///
    /// Availability of every node type is checked before the first node is
    /// created, so a missing type never leaves a half-built graph behind.
    pub fn build<E: GraphEngine>(&self, engine: &mut E) -> Result<Topology> {
        info!("Setting up pipeline");
        let mut factory = NodeFactory::new(engine);
        factory.ensure_available(&self.required_nodes())?;

        let capture = factory.make(NodeKind::CaptureSource, roles::CAPTURE)?;
        let splitter = factory.make(NodeKind::Splitter, roles::SPLITTER)?;
        factory.link_filtered(&capture, &splitter, &self.capture_filter())?;

        let analysis = self.build_analysis_branch(&mut factory, &splitter)?;
        let recording = match self.config.output_wav_path() {
            Some(path) => Some(self.build_recording_branch(
                &mut factory,
                &splitter,
                path.display().to_string(),
            )?),
            None => None,
        };

        info!(
            branches = 1 + usize::from(recording.is_some()),
            "Pipeline setup complete"
        );
        Ok(Topology {
            capture,
            splitter,
            analysis,
            recording,
        })
    }

    fn build_analysis_branch<E: GraphEngine>(
        &self,
        factory: &mut NodeFactory<'_, E>,
        splitter: &NodeId,
    ) -> Result<AnalysisBranch> {
        let config = self.config;
        let queue = factory.make(NodeKind::BufferStage, roles::CSV_QUEUE)?;
        let convert = factory.make(NodeKind::FormatStage, roles::CSV_CONVERT)?;
        let analysis = factory.make(NodeKind::AnalysisNode, roles::CSV_ANALYSIS)?;
        let sink = factory.make(NodeKind::FileSink, roles::CSV_SINK)?;
        factory.link_chain(&[splitter, &queue, &convert, &analysis, &sink])?;

        // Dithering would add noise to the test pulses.
        factory.configure(
            &convert,
            vec![(props::DITHERING, PropertyValue::Enum("none"))],
        )?;
        factory.configure(
            &analysis,
            vec![
                (
                    props::REFERENCE_CHANNEL,
                    PropertyValue::U32(config.reference_channel()),
                ),
                (
                    props::PEAK_THRESHOLD,
                    PropertyValue::F32(config.peak_threshold()),
                ),
                (
                    props::PULSE_LENGTH,
                    PropertyValue::U64(config.pulse_length_ns()),
                ),
                (
                    props::WINDOW_SIZE,
                    PropertyValue::U64(config.window_size_ns()),
                ),
                (props::OMIT_OUTPUT_IF_NO_PEAKS, PropertyValue::Bool(true)),
                (
                    props::UNDETECTED_PEAK_HANDLING,
                    PropertyValue::Enum(config.undetected_peak_handling().nick()),
                ),
                (
                    props::UNDETECTED_PEAK_FILL_VALUE,
                    PropertyValue::I64(config.undetected_peak_fill_value_ns()),
                ),
            ],
        )?;
        // Output is sparse: no clock-synchronised preroll, no write buffering.
        factory.configure(
            &sink,
            vec![
                (
                    props::LOCATION,
                    PropertyValue::Str(config.output_csv_path().display().to_string()),
                ),
                (props::ASYNC, PropertyValue::Bool(false)),
                (props::BUFFER_MODE, PropertyValue::Enum("unbuffered")),
            ],
        )?;

        Ok(AnalysisBranch {
            queue,
            convert,
            analysis,
            sink,
        })
    }

    fn build_recording_branch<E: GraphEngine>(
        &self,
        factory: &mut NodeFactory<'_, E>,
        splitter: &NodeId,
        location: String,
    ) -> Result<RecordingBranch> {
        let queue = factory.make(NodeKind::BufferStage, roles::WAV_QUEUE)?;
        let convert = factory.make(NodeKind::FormatStage, roles::WAV_CONVERT)?;
        let encoder = factory.make(NodeKind::ContainerEncoder, roles::WAV_ENCODER)?;
        let sink = factory.make(NodeKind::FileSink, roles::WAV_SINK)?;
        factory.link_chain(&[splitter, &queue, &convert, &encoder, &sink])?;

        // Recorded samples must match what the analysis node sees.
        factory.configure(
            &convert,
            vec![(props::DITHERING, PropertyValue::Enum("none"))],
        )?;
        factory.configure(
            &sink,
            vec![
                (props::LOCATION, PropertyValue::Str(location)),
                (props::ASYNC, PropertyValue::Bool(false)),
            ],
        )?;

        Ok(RecordingBranch {
            queue,
            convert,
            encoder,
            sink,
        })
    }
}
