// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The HTTP interface of text-generation-inference: `POST /generate` and `GET /health`.

use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use llmip_runtime::scheduler::HealthProbe;

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 20;

/// Body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub inputs: String,
    #[serde(default)]
    pub parameters: GenerateParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerateParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl GenerateRequest {
    pub fn new(inputs: impl Into<String>, max_new_tokens: u32) -> Self {
        GenerateRequest {
            inputs: inputs.into(),
            parameters: GenerateParameters {
                max_new_tokens: Some(max_new_tokens),
                ..Default::default()
            },
        }
    }

    /// The request printed in connection instructions
    pub fn example() -> Self {
        Self::new("What is Deep Learning?", DEFAULT_MAX_NEW_TOKENS)
    }
}

/// Response of `POST /generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub generated_text: String,
}

pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Client for one running inference server
#[derive(Debug, Clone)]
pub struct TgiClient {
    client: reqwest::Client,
    base_url: String,
}

impl TgiClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(TgiClient {
            client,
            base_url: base_url(host, port),
        })
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("POST {url} returned {status}: {body}");
        }
        response
            .json()
            .await
            .with_context(|| format!("Unexpected response from {url}"))
    }

    pub async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Health check {url} failed: {e}");
                false
            }
        }
    }
}

/// Probes `http://<node>:<port>/health`. The server answers 200 once the model is loaded.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        HttpHealthProbe { timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self, node: &str, port: u16) -> bool {
        match TgiClient::new(node, port, self.timeout) {
            Ok(client) => client.is_healthy().await,
            Err(e) => {
                tracing::warn!("{e:#}");
                false
            }
        }
    }
}
