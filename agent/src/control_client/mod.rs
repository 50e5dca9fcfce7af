use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::envelope::{Envelope, CODE_SUCCESS};
use crate::types::{ScriptResultReport, StatusReport};

/// Agent-to-controller direction. The controller answers HTTP 200 with the
/// shared envelope.
#[derive(Clone)]
pub struct ControlClient {
    base_url: String,
    client: Client,
}

impl ControlClient {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Push a workload status observed by the reconciliation loop.
    pub async fn report_deployment_status(&self, deploy_id: u64, status: &str) -> Result<()> {
        let url = format!("{}/api/v1/deployment/report", self.base_url);
        debug!("Reporting deploy_id={} status={} to {}", deploy_id, status, url);

        let report = StatusReport {
            deploy_id,
            status: status.to_string(),
        };

        let resp = self
            .client
            .post(&url)
            .json(&report)
            .send()
            .await
            .context("Failed to send status report")?;

        if !resp.status().is_success() {
            bail!("Status report failed ({})", resp.status());
        }

        let envelope = resp
            .json::<Envelope>()
            .await
            .context("Failed to parse status report response")?;
        if envelope.code != CODE_SUCCESS {
            bail!("Controller rejected status report: {}", envelope.message);
        }

        Ok(())
    }

    /// Push one finished script result. Returns the controller's envelope
    /// code; the caller decides whether that counts as an acknowledgment.
    pub async fn push_script_result(&self, report: &ScriptResultReport) -> Result<u32> {
        let url = format!("{}/api/v1/scripts/receive-result", self.base_url);
        debug!("Reporting task_id={} to {}", report.task_id, url);

        let resp = self
            .client
            .post(&url)
            .json(report)
            .send()
            .await
            .context("Failed to send script result")?;

        if !resp.status().is_success() {
            bail!("Script result report failed ({})", resp.status());
        }

        let envelope = resp
            .json::<Envelope>()
            .await
            .context("Failed to parse script result response")?;

        Ok(envelope.code)
    }
}
