//! Wire a [`Pipeline`] from config and command-line overrides.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{resolve_credential, resolve_endpoint, VmodConfig};
use crate::media::MediaExtractor;
use crate::signals::{FallbackTranscriber, FallbackVision, RemoteTranscriber, RemoteVision, Transcriber, VisionProvider};
use crate::verdict::classify::Classifier;
use crate::verdict::llm::RemoteReportWriter;
use crate::verdict::{ReportWriter, VerdictRenderer};

use super::{Pipeline, PipelineOptions};

const VISION_TIMEOUT_SECS: u64 = 30;
const TRANSCRIPTION_TIMEOUT_SECS: u64 = 120;
const REPORT_TIMEOUT_SECS: u64 = 30;

/// Per-invocation endpoint overrides (CLI flags).
#[derive(Debug, Clone, Default)]
pub struct ProviderOverrides {
    pub vision_url: Option<String>,
    pub asr_url: Option<String>,
    pub report_url: Option<String>,
    pub report_api_key: Option<String>,
    /// Ignore every endpoint and use the local fallbacks.
    pub offline: bool,
}

/// Endpoints after applying the CLI > env > config chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedEndpoints {
    pub vision: Option<String>,
    pub transcription: Option<String>,
    pub report: Option<String>,
}

pub fn resolve_endpoints(config: &VmodConfig, overrides: &ProviderOverrides) -> ResolvedEndpoints {
    if overrides.offline {
        return ResolvedEndpoints::default();
    }
    ResolvedEndpoints {
        vision: resolve_endpoint(overrides.vision_url.as_deref(), "VMOD_VISION_URL", config.vision.as_ref()),
        transcription: resolve_endpoint(
            overrides.asr_url.as_deref(),
            "VMOD_ASR_URL",
            config.transcription.as_ref(),
        ),
        report: resolve_endpoint(overrides.report_url.as_deref(), "VMOD_REPORT_URL", config.report.as_ref()),
    }
}

pub fn build_pipeline(
    config: &VmodConfig,
    overrides: &ProviderOverrides,
    extractor: Box<dyn MediaExtractor>,
) -> Result<Pipeline> {
    let endpoints = resolve_endpoints(config, overrides);
    let options = PipelineOptions::new(config.work_dir()?, &config.pipeline);

    let vision: Option<Box<dyn VisionProvider>> = match endpoints.vision {
        Some(ref url) => {
            let ep = config.vision.clone().unwrap_or_default();
            info!("Vision provider: {url}");
            Some(Box::new(
                RemoteVision::new(url, ep.model.clone(), ep.timeout(VISION_TIMEOUT_SECS))
                    .context("Failed to build vision client")?,
            ))
        }
        None => {
            info!("No vision endpoint configured, using simulator");
            None
        }
    };

    let transcriber: Option<Box<dyn Transcriber>> = match endpoints.transcription {
        Some(ref url) => {
            let ep = config.transcription.clone().unwrap_or_default();
            info!("Transcription provider: {url}");
            Some(Box::new(
                RemoteTranscriber::new(url, ep.model.clone(), ep.timeout(TRANSCRIPTION_TIMEOUT_SECS))
                    .context("Failed to build transcription client")?,
            ))
        }
        None => None,
    };

    let writer: Option<Box<dyn ReportWriter>> = match endpoints.report {
        Some(url) => {
            let ep = config.report.clone().unwrap_or_default();
            let api_key = match resolve_credential(
                overrides.report_api_key.as_deref(),
                "VMOD_REPORT_API_KEY",
                config.report.as_ref(),
            ) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Report endpoint has no API key ({e}); sending unauthenticated requests");
                    None
                }
            };
            Some(Box::new(
                RemoteReportWriter::new(url, api_key, ep.model.clone(), ep.timeout(REPORT_TIMEOUT_SECS))
                    .context("Failed to build report client")?,
            ))
        }
        None => None,
    };

    Ok(Pipeline::new(extractor, options)
        .with_vision(FallbackVision::new(vision))
        .with_transcriber(FallbackTranscriber::new(transcriber))
        .with_timeline(config.timeline.clone())
        .with_renderer(VerdictRenderer::new(Classifier::new(config.classifier.clone()), writer)))
}
