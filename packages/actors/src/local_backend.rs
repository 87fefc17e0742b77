//! Simulated backend for local development and demos.

use std::time::Duration;

use jobs_core::{Caption, JobType, ProcessingOutput};

use crate::backend::{BackendFuture, ProcessingBackend, ProcessingRequest};

/// Backend that produces placeholder artifacts after a fixed latency.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    latency: Duration,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate processing time for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Placeholder artifact for a job type.
    pub fn output_for(job_type: JobType) -> ProcessingOutput {
        match job_type {
            JobType::Summarize => ProcessingOutput::Summarize {
                summary: "This is a simplified summary of the content.".into(),
            },
            JobType::Tts => ProcessingOutput::Tts {
                audio_url: "local://tts-audio".into(),
            },
            JobType::Transcribe => ProcessingOutput::Transcribe {
                transcript: "This is a transcript of the audio.".into(),
            },
            JobType::ImageDescription => ProcessingOutput::ImageDescription {
                description: "This image shows educational content.".into(),
            },
            JobType::Ocr => ProcessingOutput::Ocr {
                text: "Extracted text from the document.".into(),
            },
            JobType::VideoProcess => ProcessingOutput::VideoProcess {
                captions: vec![Caption {
                    start: 0.0,
                    end: 10.0,
                    text: "Caption".into(),
                    language: Some("en".into()),
                }],
            },
        }
    }
}

impl ProcessingBackend for LocalBackend {
    fn execute(&self, request: &ProcessingRequest) -> BackendFuture {
        let latency = self.latency;
        let job_type = request.job_type;
        let job_id = request.job_id.clone();

        Box::pin(async move {
            tracing::debug!(%job_id, %job_type, "Local backend processing");
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(Self::output_for(job_type).into_value())
        })
    }
}
