mod engine;
mod google;
mod stage;

pub use engine::{AudioEncoding, EngineError, RecognitionConfig, RecognitionEngine, SpeechResult};
pub use google::GoogleSpeechEngine;
pub use stage::{flatten_alternatives, RecognitionError, RecognitionStage};
