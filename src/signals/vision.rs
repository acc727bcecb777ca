use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::models::{Category, CategoryScores, FrameSample, FrameSignals};

use super::VisionProvider;

const PROVIDER: &str = "vision provider";

/// Response of `POST <base>/analyze`.
#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    nudity: f64,
    #[serde(default)]
    violence: f64,
    #[serde(default)]
    weapons: f64,
    #[serde(default)]
    sexual_content: f64,
    #[serde(default)]
    drug_use: f64,
    #[serde(default)]
    objects: Vec<String>,
    /// Only the count is kept; boxes are not used downstream.
    #[serde(default)]
    faces: Vec<serde_json::Value>,
    #[serde(default)]
    scene: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Vision model reached over HTTP: one multipart upload per frame.
pub struct RemoteVision {
    url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl RemoteVision {
    pub fn new(base_url: &str, model: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(Self {
            url: format!("{}/analyze", base_url.trim_end_matches('/')),
            model: model.unwrap_or_else(|| "remote".to_string()),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }
}

impl VisionProvider for RemoteVision {
    fn name(&self) -> String {
        self.model.clone()
    }

    fn score_frame(&self, frame: &FrameSample) -> Result<FrameSignals, ProviderError> {
        let form = reqwest::blocking::multipart::Form::new()
            .file("frame", &frame.image_ref)
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: format!("cannot read {}: {e}", frame.image_ref.display()),
            })?;

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        let body: AnalyzeResponse = resp
            .json()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.timeout_secs, e))?;

        debug!("Frame {} scored remotely", frame.index);
        to_signals(body, &self.model)
    }
}

fn to_signals(body: AnalyzeResponse, source: &str) -> Result<FrameSignals, ProviderError> {
    let mut scores = CategoryScores::default();
    for (category, value) in [
        (Category::Nudity, body.nudity),
        (Category::Violence, body.violence),
        (Category::Weapons, body.weapons),
        (Category::SexualContent, body.sexual_content),
        (Category::DrugUse, body.drug_use),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ProviderError::Malformed {
                provider: PROVIDER,
                message: format!("{category} score {value} is outside [0, 1]"),
            });
        }
        scores.set(category, value);
    }

    let mut objects = body.objects;
    objects.sort();
    objects.dedup();

    let scene_label = match body.scene {
        Some(s) if !s.trim().is_empty() => s,
        _ => describe_scene(&objects),
    };

    Ok(FrameSignals {
        scores,
        faces: body.faces.len() as u32,
        scene_label,
        objects,
        confidence: body.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
        source: source.to_string(),
    })
}

/// Coarse scene description from detected objects.
pub fn describe_scene(objects: &[String]) -> String {
    let has = |name: &str| objects.iter().any(|o| o == name);
    if objects.is_empty() {
        "unrecognized scene".to_string()
    } else if has("car") || has("truck") || has("bus") {
        "street or road".to_string()
    } else if has("laptop") || has("keyboard") || has("tv") {
        "indoor office or living space".to_string()
    } else if has("dining table") || has("cup") || has("bottle") {
        "indoor dining area".to_string()
    } else if has("person") {
        "people in frame".to_string()
    } else {
        format!("scene with {}", objects.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<FrameSignals, ProviderError> {
        let body: AnalyzeResponse = serde_json::from_str(json).unwrap();
        to_signals(body, "remote")
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let s = parse(r#"{"violence": 0.4, "objects": ["person", "person", "car"], "faces": [{}, {}]}"#).unwrap();
        assert_eq!(s.scores.violence, 0.4);
        assert_eq!(s.scores.nudity, 0.0);
        assert_eq!(s.objects, vec!["car".to_string(), "person".to_string()]);
        assert_eq!(s.faces, 2);
        assert_eq!(s.scene_label, "street or road");
    }

    #[test]
    fn out_of_range_scores_are_malformed() {
        assert!(matches!(
            parse(r#"{"nudity": 1.5}"#),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_00001.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();
        let vision = RemoteVision::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let frame = FrameSample::new(0, 0.0, path, 17);
        assert!(vision.score_frame(&frame).is_err());
    }
}
