//! Typed result payloads, one shape per job type.

use serde::{Deserialize, Serialize};

use crate::JobType;

/// A single caption cue for processed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Output of a processing backend.
///
/// The engine stores the rendered JSON verbatim; this type only gives
/// backends a checked way to produce the expected shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessingOutput {
    Ocr { text: String },
    Tts {
        #[serde(rename = "audioUrl")]
        audio_url: String,
    },
    Transcribe { transcript: String },
    Summarize { summary: String },
    ImageDescription { description: String },
    VideoProcess { captions: Vec<Caption> },
}

impl ProcessingOutput {
    /// The job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            ProcessingOutput::Ocr { .. } => JobType::Ocr,
            ProcessingOutput::Tts { .. } => JobType::Tts,
            ProcessingOutput::Transcribe { .. } => JobType::Transcribe,
            ProcessingOutput::Summarize { .. } => JobType::Summarize,
            ProcessingOutput::ImageDescription { .. } => JobType::ImageDescription,
            ProcessingOutput::VideoProcess { .. } => JobType::VideoProcess,
        }
    }

    /// Render to the JSON stored as `Job::result`.
    pub fn into_value(self) -> serde_json::Value {
        // Every variant is a plain struct of strings and numbers.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_per_type_shapes() {
        let tts = ProcessingOutput::Tts {
            audio_url: "local://audio".into(),
        };
        assert_eq!(tts.job_type(), JobType::Tts);
        assert_eq!(tts.into_value(), json!({"audioUrl": "local://audio"}));

        let video = ProcessingOutput::VideoProcess {
            captions: vec![Caption {
                start: 0.0,
                end: 10.0,
                text: "Intro".into(),
                language: None,
            }],
        };
        assert_eq!(
            video.into_value(),
            json!({"captions": [{"start": 0.0, "end": 10.0, "text": "Intro"}]})
        );
    }
}
