//! CRM backend client service
//!
//! Talks to the CRM backend API for audience previews, rule generation,
//! segment persistence and session checks. Every call carries the current
//! session's credentials; without a session the call fails before any request
//! is sent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::models::{
    AuthCheckResponse, CreateSegmentRequest, CreatedSegment, GenerateRulesRequest,
    GenerateRulesResponse, PreviewRequest, PreviewResponse, RuleTree, SegmentSummary, User,
};
use crate::services::collaborators::{
    AudienceEvaluator, RuleGenerator, SegmentStore, SessionProvider,
};
use crate::utils::validation::validate_segment_id;
use crate::utils::{AppError, AppResult};

/// Backend endpoint paths
pub mod endpoints {
    pub const SEGMENTS: &str = "/api/segments";
    pub const SEGMENT_PREVIEW: &str = "/api/segments/preview";
    pub const SEGMENT_GENERATE_RULES: &str = "/api/segments/generate-rules";
    pub const AUTH_CHECK: &str = "/api/auth/check";
    pub const AUTH_ME: &str = "/api/auth/me";
}

/// CRM backend API client
#[derive(Clone)]
pub struct CrmApiClient {
    client: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl CrmApiClient {
    /// Create a new backend client
    pub fn new(config: &BackendConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        info!("Initializing CRM backend client for {}", config.url);

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if !config.ssl_verify {
            warn!("SSL certificate verification is DISABLED - this is insecure!");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach session credentials; fails when nobody is signed in
    fn authorized(&self, request: RequestBuilder) -> AppResult<RequestBuilder> {
        let session = self
            .session
            .current_session()
            .ok_or_else(|| AppError::Unauthorized("No active session".to_string()))?;
        Ok(match session.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .authorized(self.client.post(&url))?
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.authorized(self.client.get(&url))?.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> AppResult<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::from_status(status.as_u16(), body))
        }
    }

    // ==================== Auth Endpoints ====================

    /// Ask the backend whether the current session is still authenticated
    pub async fn check_auth(&self) -> AppResult<bool> {
        match self.get::<AuthCheckResponse>(endpoints::AUTH_CHECK).await {
            Ok(response) => Ok(response.authenticated),
            Err(AppError::Unauthorized(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch the signed-in user
    pub async fn current_user(&self) -> AppResult<User> {
        self.get(endpoints::AUTH_ME).await
    }
}

#[async_trait]
impl AudienceEvaluator for CrmApiClient {
    async fn audience_size(&self, rules: &RuleTree) -> AppResult<u64> {
        info!(
            "Requesting audience preview for {} condition(s)",
            rules.condition_count()
        );
        let response: PreviewResponse = self
            .post(endpoints::SEGMENT_PREVIEW, &PreviewRequest { rules })
            .await?;
        Ok(response.audience_size)
    }
}

#[async_trait]
impl RuleGenerator for CrmApiClient {
    async fn generate_rules(&self, query: &str) -> AppResult<RuleTree> {
        info!("Requesting generated rules ({} chars)", query.len());
        let response: GenerateRulesResponse = self
            .post(
                endpoints::SEGMENT_GENERATE_RULES,
                &GenerateRulesRequest {
                    query: query.to_string(),
                },
            )
            .await?;
        RuleTree::from_value(&response.rules).map_err(|e| {
            warn!("Generated rules rejected: {}", e);
            AppError::from(e)
        })
    }
}

#[async_trait]
impl SegmentStore for CrmApiClient {
    async fn create_segment(&self, request: &CreateSegmentRequest) -> AppResult<CreatedSegment> {
        info!("Creating segment '{}'", request.name);
        self.post(endpoints::SEGMENTS, request).await
    }

    async fn list_segments(&self) -> AppResult<Vec<SegmentSummary>> {
        self.get(endpoints::SEGMENTS).await
    }

    async fn get_segment(&self, id: &str) -> AppResult<Option<SegmentSummary>> {
        if !validate_segment_id(id) {
            return Err(AppError::Validation(format!("Invalid segment id: {}", id)));
        }
        let path = format!("{}/{}", endpoints::SEGMENTS, urlencoding::encode(id));
        match self.get(&path).await {
            Ok(segment) => Ok(Some(segment)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for CrmApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
