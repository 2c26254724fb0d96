use crate::{LogCollector, LogCollectorConfig, LogCollectorError};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// HTTP client for the log collector service.
pub struct LogCollectorClient {
    endpoint: String,
    web_client: Client,
}

impl LogCollectorClient {
    pub fn new(config: LogCollectorConfig, web_client: Client) -> Self {
        LogCollectorClient {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            web_client,
        }
    }

    fn stop_logs_endpoint(&self, project: &str) -> String {
        format!("{}/projects/{project}/logs/stop", self.endpoint)
    }

    fn delete_logs_endpoint(&self, project: &str) -> String {
        format!("{}/projects/{project}/logs", self.endpoint)
    }

    /// Surface non-success statuses as errors so callers see one failure type
    /// for both transport and service-side problems.
    fn check_status(
        endpoint: String,
        response: &reqwest::Response,
    ) -> Result<(), LogCollectorError> {
        let status = response.status();
        if !status.is_success() {
            return Err(LogCollectorError::Status { status, endpoint });
        }
        Ok(())
    }
}

#[async_trait]
impl LogCollector for LogCollectorClient {
    async fn stop_logs(&self, project: &str) -> Result<(), LogCollectorError> {
        let endpoint = self.stop_logs_endpoint(project);
        debug!("Requesting log stop at {endpoint}");

        let response = self.web_client.post(&endpoint).send().await?;
        Self::check_status(endpoint, &response)
    }

    async fn delete_logs(&self, project: &str) -> Result<(), LogCollectorError> {
        let endpoint = self.delete_logs_endpoint(project);
        debug!("Requesting log deletion at {endpoint}");

        let response = self.web_client.delete(&endpoint).send().await?;
        Self::check_status(endpoint, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian::LogCollectorMode;

    fn client(endpoint: &str) -> LogCollectorClient {
        LogCollectorClient::new(
            LogCollectorConfig {
                endpoint: endpoint.to_string(),
                mode: LogCollectorMode::Sidecar,
            },
            Client::new(),
        )
    }

    #[test]
    fn endpoints_address_the_project_by_name() {
        let client = client("http://log-collector:8282");
        assert_eq!(
            client.stop_logs_endpoint("iris"),
            "http://log-collector:8282/projects/iris/logs/stop"
        );
        assert_eq!(
            client.delete_logs_endpoint("iris"),
            "http://log-collector:8282/projects/iris/logs"
        );
    }

    #[test]
    fn trailing_slash_on_endpoint_is_normalized() {
        let client = client("http://log-collector:8282/");
        assert_eq!(
            client.delete_logs_endpoint("iris"),
            "http://log-collector:8282/projects/iris/logs"
        );
    }
}
