//! OCR provider: send a page raster to a text-detection service.
//!
//! The pipeline only sees the [`OcrProvider`] trait. [`TextractProvider`]
//! calls AWS Textract `DetectDocumentText`; [`MockOcrProvider`] returns
//! scripted responses so the skip-on-failure and throttling behaviour can be
//! tested without network access or credentials.
//!
//! ## Throttling
//!
//! [`Throttle`] enforces a fixed minimum delay between the previous
//! *successful* call and the next call. Failed calls do not reset it: the
//! delay exists to respect the provider's steady-state rate limit, and a
//! rejected request did not consume capacity.
//!
//! ## Retry
//!
//! [`recognize_page`] makes `1 + max_retries` attempts with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`). The default of zero retries
//! leaves a failing page for the next run. Whatever the setting, the result
//! is a [`PageError`], never a fatal error.

use crate::config::PipelineConfig;
use crate::error::{OcrPdfError, PageError};
use crate::model::{
    Block, BlockType, BoundingBox, DocumentMetadata, Geometry, OcrResponse, Point, Relationship,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_textract::config::Region;
use aws_sdk_textract::error::{DisplayErrorContext, SdkError};
use aws_sdk_textract::operation::detect_document_text::DetectDocumentTextOutput;
use aws_sdk_textract::operation::RequestId;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::Document;
use aws_sdk_textract::Client;
use serde_json::{json, Map};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Failure of a single OCR call.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// The service rejected the call for rate reasons.
    #[error("OCR service throttled the request: {0}")]
    Throttled(String),

    /// The service processed the call and returned an error.
    #[error("OCR service error: {0}")]
    Service(String),

    /// The request never got a response (DNS, TLS, timeout, credentials…).
    #[error("OCR transport error: {0}")]
    Transport(String),

    /// The service could not decode the image.
    #[error("OCR service rejected the image: {0}")]
    InvalidImage(String),
}

/// A text-detection capability.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Short name for logs, e.g. `"textract"`.
    fn name(&self) -> &str;

    /// Recognise text in an encoded page image (PNG or JPEG bytes).
    async fn recognize(&self, image: &[u8]) -> Result<OcrResponse, OcrError>;
}

// ── Throttle ─────────────────────────────────────────────────────────────

/// Minimum spacing between consecutive successful calls.
#[derive(Debug)]
pub struct Throttle {
    min_delay: Duration,
    last_success: Option<Instant>,
}

impl Throttle {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_success: None,
        }
    }

    /// Sleep until `min_delay` has passed since the last success.
    pub async fn wait(&self) {
        if let Some(remaining) = self.remaining() {
            debug!("Throttle: waiting {}ms", remaining.as_millis());
            sleep(remaining).await;
        }
    }

    /// Time still to wait before the next call, if any.
    pub fn remaining(&self) -> Option<Duration> {
        let last = self.last_success?;
        let ready_at = last + self.min_delay;
        let now = Instant::now();
        (ready_at > now).then(|| ready_at - now)
    }

    pub fn record_success(&mut self) {
        self.last_success = Some(Instant::now());
    }
}

// ── Per-page call with retry ─────────────────────────────────────────────

/// OCR one page's encoded raster, honouring throttle and retry settings.
pub async fn recognize_page(
    provider: &dyn OcrProvider,
    page_num: usize,
    image: &[u8],
    throttle: &mut Throttle,
    config: &PipelineConfig,
) -> Result<OcrResponse, PageError> {
    let mut last_err: Option<OcrError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        throttle.wait().await;
        let start = Instant::now();

        match provider.recognize(image).await {
            Ok(response) => {
                throttle.record_success();
                debug!(
                    "Page {}: {} blocks ({} lines) from {} in {:?}",
                    page_num,
                    response.blocks.len(),
                    response.line_count(),
                    provider.name(),
                    start.elapsed()
                );
                return Ok(response);
            }
            Err(e) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(PageError::OcrFailed {
        page: page_num,
        retries: config.max_retries,
        detail: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string()),
    })
}

// ── AWS Textract ─────────────────────────────────────────────────────────

/// [`OcrProvider`] backed by AWS Textract `DetectDocumentText`.
///
/// Credentials come from the standard AWS chain (env vars, profile, IMDS).
#[derive(Clone)]
pub struct TextractProvider {
    client: Client,
}

impl TextractProvider {
    /// Build a client for the configured region and optional endpoint.
    pub async fn new(config: &PipelineConfig) -> Result<Self, OcrPdfError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(ref url) = config.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let shared = loader.load().await;

        ensure_credentials(&shared).await?;

        info!(
            "Textract client ready (region {}{})",
            config.region,
            config
                .endpoint_url
                .as_deref()
                .map(|u| format!(", endpoint {u}"))
                .unwrap_or_default()
        );

        Ok(Self {
            client: Client::new(&shared),
        })
    }

    /// Wrap an already configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Resolve credentials once, before the page loop starts.
async fn ensure_credentials(shared: &SdkConfig) -> Result<(), OcrPdfError> {
    let provider = shared
        .credentials_provider()
        .ok_or_else(|| no_credentials("no credentials provider configured"))?;
    provider
        .provide_credentials()
        .await
        .map_err(|e| no_credentials(&DisplayErrorContext(&e).to_string()))?;
    Ok(())
}

fn no_credentials(detail: &str) -> OcrPdfError {
    OcrPdfError::ProviderNotConfigured {
        provider: "textract".to_string(),
        hint: format!(
            "No AWS credentials could be resolved ({detail}).\n\
             Set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY or AWS_PROFILE."
        ),
    }
}

#[async_trait]
impl OcrProvider for TextractProvider {
    fn name(&self) -> &str {
        "textract"
    }

    async fn recognize(&self, image: &[u8]) -> Result<OcrResponse, OcrError> {
        let document = Document::builder().bytes(Blob::new(image.to_vec())).build();

        let output = self
            .client
            .detect_document_text()
            .document(document)
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                match &e {
                    SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                        OcrError::Transport(detail)
                    }
                    _ => match e.as_service_error() {
                        Some(s)
                            if s.is_throttling_exception()
                                || s.is_provisioned_throughput_exceeded_exception() =>
                        {
                            OcrError::Throttled(detail)
                        }
                        Some(s)
                            if s.is_invalid_parameter_exception()
                                || s.is_unsupported_document_exception()
                                || s.is_bad_document_exception()
                                || s.is_document_too_large_exception() =>
                        {
                            OcrError::InvalidImage(detail)
                        }
                        _ => OcrError::Service(detail),
                    },
                }
            })?;

        Ok(response_from_textract(&output))
    }
}

/// Convert the SDK output into the cached response shape.
pub fn response_from_textract(output: &DetectDocumentTextOutput) -> OcrResponse {
    let blocks = output
        .blocks()
        .iter()
        .map(|b| Block {
            block_type: b
                .block_type()
                .map(|t| BlockType::from(t.as_str()))
                .unwrap_or_else(|| BlockType::Other(String::new())),
            id: b.id().map(str::to_string),
            text: b.text().map(str::to_string),
            confidence: b.confidence().map(f64::from),
            text_type: b.text_type().map(|t| t.as_str().to_string()),
            geometry: b.geometry().map(|g| Geometry {
                bounding_box: g.bounding_box().map(|bb| BoundingBox {
                    width: f64::from(bb.width()),
                    height: f64::from(bb.height()),
                    left: f64::from(bb.left()),
                    top: f64::from(bb.top()),
                }),
                polygon: g
                    .polygon()
                    .iter()
                    .map(|p| Point {
                        x: f64::from(p.x()),
                        y: f64::from(p.y()),
                    })
                    .collect(),
                extra: Map::new(),
            }),
            relationships: b
                .relationships()
                .iter()
                .map(|r| Relationship {
                    kind: r.r#type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                    ids: r.ids().to_vec(),
                })
                .collect(),
            page: b.page(),
            extra: Map::new(),
        })
        .collect();

    let mut extra = Map::new();
    if let Some(request_id) = output.request_id() {
        extra.insert(
            "ResponseMetadata".to_string(),
            json!({ "RequestId": request_id }),
        );
    }

    OcrResponse {
        document_metadata: output.document_metadata().map(|m| DocumentMetadata {
            pages: m.pages(),
        }),
        blocks,
        detect_document_text_model_version: output
            .detect_document_text_model_version()
            .map(str::to_string),
        extra,
    }
}

// ── Mock ─────────────────────────────────────────────────────────────────

type Responder = dyn Fn(usize, &[u8]) -> Result<OcrResponse, OcrError> + Send + Sync;

/// Deterministic [`OcrProvider`] for tests.
///
/// Scripted results are returned in call order; once the script runs out the
/// fallback responder is used (by default one LINE block `"call <n>"`).
/// Every call's start instant is recorded.
pub struct MockOcrProvider {
    script: Mutex<VecDeque<Result<OcrResponse, OcrError>>>,
    fallback: Arc<Responder>,
    calls: Mutex<Vec<Instant>>,
}

impl Default for MockOcrProvider {
    fn default() -> Self {
        Self::from_fn(|call, _| Ok(OcrResponse::from_blocks(vec![Block::line(format!("call {call}"))])))
    }
}

impl MockOcrProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with `f(call_index, image_bytes)` (0-based index).
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(usize, &[u8]) -> Result<OcrResponse, OcrError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Arc::new(f),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Return `results` for the first calls, in order.
    pub fn with_script(self, results: Vec<Result<OcrResponse, OcrError>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(results);
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OcrProvider for MockOcrProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn recognize(&self, image: &[u8]) -> Result<OcrResponse, OcrError> {
        let call = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| OcrError::Service("mock lock poisoned".into()))?;
            calls.push(Instant::now());
            calls.len() - 1
        };
        let scripted = self
            .script
            .lock()
            .map_err(|_| OcrError::Service("mock lock poisoned".into()))?
            .pop_front();
        match scripted {
            Some(result) => result,
            None => (self.fallback)(call, image),
        }
    }
}
