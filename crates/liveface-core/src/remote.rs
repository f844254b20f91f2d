//! HTTP client for the external inference service.
//!
//! Landmark extraction and face embedding are delegated to a sidecar
//! service that wraps the actual models. The wire contract is small:
//! the frame is POSTed as PNG, the reply is JSON with a `null` payload
//! when no face is found.
//!
//! - `POST {base}/landmarks` → `{"landmarks": [[x, y, z], ...] | null}`
//! - `POST {base}/embeddings` → `{"embedding": [f32, ...] | null}`

use std::io::Cursor;
use std::time::Duration;

use image::RgbImage;
use serde::Deserialize;
use ureq::Agent;

use crate::backend::{BackendError, FaceEncoder, LandmarkExtractor};
use crate::landmarks::LandmarkSet;
use crate::matcher::Embedding;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct LandmarksReply {
    landmarks: Option<Vec<[f32; 3]>>,
}

#[derive(Deserialize)]
struct EmbeddingReply {
    embedding: Option<Vec<f32>>,
}

/// Client handle for the inference sidecar. Cheap to clone; create once at
/// startup and pass by reference.
#[derive(Clone)]
pub struct RemoteInference {
    agent: Agent,
    base_url: String,
}

impl RemoteInference {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .new_agent();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn post_frame(&self, endpoint: &str, frame: &RgbImage) -> Result<ureq::Body, BackendError> {
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|err| BackendError::new(format!("failed to encode frame: {err}")))?;

        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .agent
            .post(&url)
            .header("Content-Type", "image/png")
            .send(&png[..])
            .map_err(|err| BackendError::new(format!("{endpoint} request failed: {err}")))?;

        Ok(response.into_body())
    }
}

impl LandmarkExtractor for RemoteInference {
    fn extract(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, BackendError> {
        let mut body = self.post_frame("landmarks", frame)?;
        let reply: LandmarksReply = body
            .read_json()
            .map_err(|err| BackendError::new(format!("invalid landmarks reply: {err}")))?;

        match reply.landmarks {
            None => Ok(None),
            Some(triples) => {
                let set = LandmarkSet::from_triples(&triples)
                    .map_err(|err| BackendError::new(format!("malformed landmark payload: {err}")))?;
                Ok(Some(set))
            }
        }
    }
}

impl FaceEncoder for RemoteInference {
    fn encode(&mut self, image: &RgbImage) -> Result<Option<Embedding>, BackendError> {
        let mut body = self.post_frame("embeddings", image)?;
        let reply: EmbeddingReply = body
            .read_json()
            .map_err(|err| BackendError::new(format!("invalid embedding reply: {err}")))?;

        Ok(reply.embedding.map(Embedding::new))
    }
}
