//! HTTP/JSON implementation of the `TaskServiceRpc` channel.
//!
//! Routes, relative to `base_url`:
//! - `POST perpetual-tasks/{task_type}/params`
//! - `POST perpetual-tasks/{task_type}/state-change`
//! - `POST perpetual-tasks/{task_type}/validation-task`

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    AccountId, DelegateTask, PerpetualTaskClientContext, PerpetualTaskId, PerpetualTaskResponse,
    PerpetualTaskType, TaskParams,
};
use crate::error::CourierError;
use crate::ports::TaskServiceRpc;

#[derive(Debug, Serialize)]
struct ParamsRequest<'a> {
    context: &'a PerpetualTaskClientContext,
}

#[derive(Debug, Serialize)]
struct StateChangeRequest<'a> {
    task_id: PerpetualTaskId,
    new_response: &'a PerpetualTaskResponse,
    old_response: Option<&'a PerpetualTaskResponse>,
}

#[derive(Debug, Serialize)]
struct ValidationRequest<'a> {
    context: &'a PerpetualTaskClientContext,
    account_id: &'a AccountId,
}

#[derive(Debug, Clone)]
pub struct HttpTaskServiceRpc {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTaskServiceRpc {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Remote(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn route(&self, task_type: &PerpetualTaskType, action: &str) -> String {
        format!("{}/perpetual-tasks/{}/{}", self.base_url, task_type, action)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, CourierError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CourierError::Remote(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::Remote(format!("POST {url}: status {status}")));
        }
        Ok(response)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, CourierError> {
        self.post(url, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CourierError::Remote(format!("decode response of {url}: {e}")))
    }
}

#[async_trait]
impl TaskServiceRpc for HttpTaskServiceRpc {
    async fn obtain_task_params(
        &self,
        task_type: &PerpetualTaskType,
        context: &PerpetualTaskClientContext,
    ) -> Result<TaskParams, CourierError> {
        let url = self.route(task_type, "params");
        self.post_json(&url, &ParamsRequest { context }).await
    }

    async fn report_state_change(
        &self,
        task_type: &PerpetualTaskType,
        task_id: PerpetualTaskId,
        new_response: &PerpetualTaskResponse,
        old_response: Option<&PerpetualTaskResponse>,
    ) -> Result<(), CourierError> {
        let url = self.route(task_type, "state-change");
        let body = StateChangeRequest {
            task_id,
            new_response,
            old_response,
        };
        self.post(&url, &body).await.map(|_| ())
    }

    async fn obtain_validation_task(
        &self,
        task_type: &PerpetualTaskType,
        context: &PerpetualTaskClientContext,
        account_id: &AccountId,
    ) -> Result<DelegateTask, CourierError> {
        let url = self.route(task_type, "validation-task");
        self.post_json(&url, &ValidationRequest {
            context,
            account_id,
        })
        .await
    }
}
