//! Infrastructure implementation of the `SchedulerClient` port.
//!
//! Talks JSON over HTTP to the Aviary gateway's cron API. Blocking `ureq`
//! calls run on `spawn_blocking`; the connect handshake and every
//! individual call are bounded by one explicit timeout. A timed-out call is
//! a failure of that one operation, never of the whole migration — the
//! executor decides what to do with each returned `Result`.

use std::time::Duration;

use serde::Deserialize;

use crate::application::ports::{CronJobParams, RemoteJob, SchedulerClient};
use crate::domain::error::SchedulerError;

/// Default gateway endpoint (`AVIARY_GATEWAY` overrides).
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8791";

/// Timeout applied to the handshake and to each individual call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway cron client. Cheap to clone; one instance per executor
/// invocation (connect once, then issue calls).
#[derive(Clone)]
pub struct GatewayClient {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Deserialize)]
struct AddJobResponse {
    id: String,
}

#[derive(Deserialize)]
struct ListJobsResponse {
    #[serde(default)]
    jobs: Vec<RemoteJob>,
}

impl GatewayClient {
    /// Connect to the gateway: build the bounded agent and verify the
    /// health endpoint answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable within the timeout.
    pub fn connect(base_url: &str, timeout: Duration) -> Result<Self, SchedulerError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        let client = Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        };
        client
            .agent
            .get(&client.url("api/health"))
            .call()
            .map_err(|err| map_error(err, "health check"))?;
        Ok(client)
    }

    /// Connect using `AVIARY_GATEWAY` or the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable within the timeout.
    pub fn connect_from_env() -> Result<Self, SchedulerError> {
        let base = std::env::var("AVIARY_GATEWAY")
            .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        Self::connect(&base, CALL_TIMEOUT)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn add_job_sync(&self, params: &CronJobParams) -> Result<String, SchedulerError> {
        let response = self
            .agent
            .post(&self.url("api/cron/jobs"))
            .send_json(params)
            .map_err(|err| map_error(err, &format!("adding job '{}'", params.name)))?;
        let parsed: AddJobResponse = response
            .into_json()
            .map_err(|err| SchedulerError::Protocol(err.to_string()))?;
        Ok(parsed.id)
    }

    fn update_job_sync(&self, id: &str, patch: &CronJobParams) -> Result<(), SchedulerError> {
        self.agent
            .request("PATCH", &self.url(&format!("api/cron/jobs/{id}")))
            .send_json(patch)
            .map_err(|err| map_error(err, &format!("updating job {id}")))?;
        Ok(())
    }

    fn remove_job_sync(&self, id: &str) -> Result<(), SchedulerError> {
        self.agent
            .delete(&self.url(&format!("api/cron/jobs/{id}")))
            .call()
            .map_err(|err| map_error(err, &format!("removing job {id}")))?;
        Ok(())
    }

    fn list_jobs_sync(&self) -> Result<Vec<RemoteJob>, SchedulerError> {
        let response = self
            .agent
            .get(&self.url("api/cron/jobs"))
            .call()
            .map_err(|err| map_error(err, "listing jobs"))?;
        let parsed: ListJobsResponse = response
            .into_json()
            .map_err(|err| SchedulerError::Protocol(err.to_string()))?;
        Ok(parsed.jobs)
    }
}

fn map_error(err: ureq::Error, what: &str) -> SchedulerError {
    match err {
        ureq::Error::Status(404, _) => SchedulerError::NotFound(what.to_string()),
        ureq::Error::Status(code, _) => {
            SchedulerError::Remote(format!("{what}: HTTP {code}"))
        }
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            if message.contains("timed out") {
                SchedulerError::Timeout(format!("{what}: {message}"))
            } else {
                SchedulerError::Unreachable(format!("{what}: {message}"))
            }
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> SchedulerError {
    SchedulerError::Protocol(format!("scheduler task panicked: {err}"))
}

impl SchedulerClient for GatewayClient {
    async fn add_job(&self, params: &CronJobParams) -> Result<String, SchedulerError> {
        let client = self.clone();
        let params = params.clone();
        tokio::task::spawn_blocking(move || client.add_job_sync(&params))
            .await
            .map_err(join_error)?
    }

    async fn update_job(&self, id: &str, patch: &CronJobParams) -> Result<(), SchedulerError> {
        let client = self.clone();
        let id = id.to_string();
        let patch = patch.clone();
        tokio::task::spawn_blocking(move || client.update_job_sync(&id, &patch))
            .await
            .map_err(join_error)?
    }

    async fn remove_job(&self, id: &str) -> Result<(), SchedulerError> {
        let client = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || client.remove_job_sync(&id))
            .await
            .map_err(join_error)?
    }

    async fn list_jobs(&self) -> Result<Vec<RemoteJob>, SchedulerError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.list_jobs_sync())
            .await
            .map_err(join_error)?
    }
}
