//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};

/// All events emitted by the denoiser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Request-level events
    Request(RequestEvent),
    /// Cache events
    Cache(CacheEvent),
    /// Pipeline stage events
    Pipeline(PipelineEvent),
}

/// Events for one upload passing through the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestEvent {
    /// Upload accepted for processing
    Started { hash: String },
    /// Another request is already computing this hash; waiting for it
    Joined { hash: String },
    /// Result ready
    Completed {
        hash: String,
        from_cache: bool,
        duration_ms: u64,
    },
    /// Request failed
    Failed { message: String },
}

/// Events from the result cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Output found for this hash
    Hit { hash: String },
    /// No output stored for this hash
    Miss { hash: String },
    /// Cache could not be read; treated as a miss
    Unavailable { hash: String, message: String },
    /// Output stored
    Stored { hash: String, bytes: u64 },
    /// Cache cleared
    Cleared { removed: usize },
}

/// Events from the denoising pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// A stage has started
    StageStarted { stage: PipelineStage },
    /// A stage finished successfully
    StageCompleted {
        stage: PipelineStage,
        duration_ms: u64,
    },
    /// A stage failed; the pipeline stops here
    StageFailed {
        stage: PipelineStage,
        message: String,
    },
}

/// Stages of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Normalize,
    NonLocalMeans,
    TotalVariation,
    Sharpen,
    Quantize,
}

impl PipelineStage {
    /// All stages in the order they run
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Normalize,
        PipelineStage::NonLocalMeans,
        PipelineStage::TotalVariation,
        PipelineStage::Sharpen,
        PipelineStage::Quantize,
    ];

    /// Short identifier used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Normalize => "normalize",
            PipelineStage::NonLocalMeans => "nl_means",
            PipelineStage::TotalVariation => "tv_denoise",
            PipelineStage::Sharpen => "sharpen",
            PipelineStage::Quantize => "quantize",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Normalize => write!(f, "Normalizing"),
            PipelineStage::NonLocalMeans => write!(f, "Non-local means"),
            PipelineStage::TotalVariation => write!(f, "Total variation"),
            PipelineStage::Sharpen => write!(f, "Sharpening"),
            PipelineStage::Quantize => write!(f, "Quantizing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Pipeline(PipelineEvent::StageCompleted {
            stage: PipelineStage::TotalVariation,
            duration_ms: 42,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Pipeline(PipelineEvent::StageCompleted { stage, duration_ms }) => {
                assert_eq!(stage, PipelineStage::TotalVariation);
                assert_eq!(duration_ms, 42);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn stage_identifiers_are_unique() {
        let mut names: Vec<_> = PipelineStage::ALL.iter().map(|s| s.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PipelineStage::ALL.len());
    }
}
