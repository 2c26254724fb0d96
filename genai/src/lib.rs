/*
   Polar (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/
//! REST client for the generative-AI application service.
//!
//! The service speaks a uniform envelope: mutations answer
//! `{"success": bool}` and reads answer `{"data": ...}`. This client builds
//! the URLs, prunes unset query parameters, attaches the calling user, and
//! unwraps that envelope.

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub const GENAI_API_URL_ENV_VAR: &str = "GENAI_API_URL";
pub const GENAI_USERNAME_ENV_VAR: &str = "GENAI_USERNAME";
pub const GENAI_TOKEN_ENV_VAR: &str = "GENAI_TOKEN";

const USERNAME_HEADER: &str = "x_username";
const DEFAULT_USERNAME: &str = "guest";

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("genai request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("genai service returned {status} for {endpoint}")]
    Status {
        status: StatusCode,
        endpoint: String,
    },

    #[error("genai response is missing the \"{0}\" field")]
    MissingField(&'static str),

    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Base configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct GenAiConfig {
    pub api_url: String,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl GenAiConfig {
    pub fn from_env() -> Self {
        let api_url = env::var(GENAI_API_URL_ENV_VAR).expect("Expected a value for GENAI_API_URL.");

        GenAiConfig {
            api_url,
            username: env::var(GENAI_USERNAME_ENV_VAR).ok(),
            token: env::var(GENAI_TOKEN_ENV_VAR).ok(),
        }
    }
}

/// A chat session record, as the service stores it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    pub name: String,
    pub username: Option<String>,
    pub agent_name: Option<String>,
    pub history: Option<Value>,
    pub features: Option<Value>,
    pub state: Option<Value>,
}

/// Answer from a pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineAnswer {
    pub answer: Value,
    pub sources: Value,
    pub returned_state: Value,
}

pub struct GenAiClient {
    base_url: String,
    username: String,
    token: Option<String>,
    web_client: Client,
}

type QueryParams<'a> = Vec<(&'a str, Option<String>)>;

impl GenAiClient {
    pub fn new(config: GenAiConfig, web_client: Client) -> Self {
        GenAiClient {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            username: config
                .username
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            token: config.token,
            web_client,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    /// Unset parameters are dropped rather than sent as empty strings.
    fn prune_params(params: QueryParams<'_>) -> Vec<(String, String)> {
        params
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
            .collect()
    }

    /// Dispatch one request and return the parsed JSON body.
    pub async fn post_request(
        &self,
        method: Method,
        path: &str,
        params: QueryParams<'_>,
        body: Option<Value>,
    ) -> Result<Value, GenAiError> {
        let endpoint = self.api_url(path);
        debug!("Sending {method} request to {endpoint}");

        let mut request = self
            .web_client
            .request(method, &endpoint)
            .header(USERNAME_HEADER, &self.username)
            .query(&Self::prune_params(params));

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenAiError::Status { status, endpoint });
        }

        Ok(response.json().await?)
    }

    fn success_of(response: Value) -> Result<bool, GenAiError> {
        response
            .get("success")
            .and_then(Value::as_bool)
            .ok_or(GenAiError::MissingField("success"))
    }

    fn data_of(mut response: Value) -> Result<Value, GenAiError> {
        response
            .get_mut("data")
            .map(Value::take)
            .ok_or(GenAiError::MissingField("data"))
    }

    pub async fn create_tables(
        &self,
        drop_old: bool,
        names: &[String],
    ) -> Result<bool, GenAiError> {
        let mut params: QueryParams<'_> = vec![("drop_old", Some(drop_old.to_string()))];
        for name in names {
            params.push(("names", Some(name.clone())));
        }

        let response = self
            .post_request(Method::POST, "tables", params, None)
            .await?;
        Self::success_of(response)
    }

    pub async fn list_collections(
        &self,
        owner: Option<&str>,
        labels: Option<&str>,
        output_mode: Option<&str>,
    ) -> Result<Value, GenAiError> {
        let response = self
            .post_request(
                Method::GET,
                "collections",
                vec![
                    ("owner", owner.map(str::to_string)),
                    ("labels", labels.map(str::to_string)),
                    ("mode", output_mode.map(str::to_string)),
                ],
                None,
            )
            .await?;
        Self::data_of(response)
    }

    pub async fn create_collection(
        &self,
        name: &str,
        mut attrs: serde_json::Map<String, Value>,
    ) -> Result<bool, GenAiError> {
        attrs
            .entry("name".to_string())
            .or_insert_with(|| json!(name));

        let response = self
            .post_request(
                Method::POST,
                &format!("collection/{name}"),
                vec![],
                Some(Value::Object(attrs)),
            )
            .await?;
        Self::success_of(response)
    }

    pub async fn update_collection(
        &self,
        name: &str,
        attrs: serde_json::Map<String, Value>,
    ) -> Result<bool, GenAiError> {
        let response = self
            .post_request(
                Method::PUT,
                &format!("collection/{name}"),
                vec![],
                Some(Value::Object(attrs)),
            )
            .await?;
        Self::success_of(response)
    }

    pub async fn get_collection(&self, name: &str) -> Result<Value, GenAiError> {
        let response = self
            .post_request(Method::GET, &format!("collection/{name}"), vec![], None)
            .await?;
        Self::data_of(response)
    }

    /// Run an application pipeline against a collection and return its
    /// answer, the sources it cites, and the state it hands back.
    pub async fn run_pipeline(
        &self,
        name: Option<&str>,
        query: &str,
        collection: &str,
        session_id: Option<&str>,
        filter: Option<Value>,
    ) -> Result<PipelineAnswer, GenAiError> {
        let path = format!("pipeline/{}/run", name.unwrap_or("default"));
        let response = self
            .post_request(
                Method::POST,
                &path,
                vec![],
                Some(json!({
                    "question": query,
                    "collection": collection,
                    "session_id": session_id,
                    "filter": filter,
                })),
            )
            .await?;

        let data = Self::data_of(response)?;
        serde_json::from_value(data).map_err(|_| GenAiError::MissingField("answer"))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Value, GenAiError> {
        self.post_request(Method::GET, &format!("session/{session_id}"), vec![], None)
            .await
    }

    pub async fn list_sessions(
        &self,
        username: Option<&str>,
        created_after: Option<&str>,
        last: Option<u32>,
        output_mode: Option<&str>,
    ) -> Result<Value, GenAiError> {
        self.post_request(
            Method::GET,
            "sessions",
            vec![
                ("username", username.map(str::to_string)),
                ("created_after", created_after.map(str::to_string)),
                ("last", last.map(|n| n.to_string())),
                ("mode", output_mode.map(str::to_string)),
            ],
            None,
        )
        .await
    }

    pub async fn create_session(&self, session: &ChatSession) -> Result<bool, GenAiError> {
        let response = self
            .post_request(
                Method::POST,
                "session",
                vec![],
                Some(serde_json::to_value(session).expect("session serializes")),
            )
            .await?;
        Self::success_of(response)
    }

    pub async fn update_session(&self, mut session: ChatSession) -> Result<bool, GenAiError> {
        if session.username.is_none() {
            session.username = Some(self.username.clone());
        }

        let path = format!("session/{}", session.name);
        let response = self
            .post_request(
                Method::PUT,
                &path,
                vec![],
                Some(serde_json::to_value(&session).expect("session serializes")),
            )
            .await?;
        Self::success_of(response)
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<bool, GenAiError> {
        let response = self
            .post_request(
                Method::POST,
                &format!("user/{username}"),
                vec![],
                Some(json!({
                    "name": username,
                    "email": email,
                    "full_name": full_name,
                })),
            )
            .await?;
        Self::success_of(response)
    }

    pub async fn get_user(&self, username: &str) -> Result<Value, GenAiError> {
        let response = self
            .post_request(Method::GET, &format!("user/{username}"), vec![], None)
            .await?;
        Self::data_of(response)
    }

    pub async fn list_users(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        output_mode: Option<&str>,
    ) -> Result<Value, GenAiError> {
        let response = self
            .post_request(
                Method::GET,
                "users",
                vec![
                    ("email", email.map(str::to_string)),
                    ("username", username.map(str::to_string)),
                    ("mode", output_mode.map(str::to_string)),
                ],
                None,
            )
            .await?;
        Self::data_of(response)
    }

    /// Upload an audio file for transcription.
    pub async fn transcribe(&self, audio_file: &Path) -> Result<Value, GenAiError> {
        let contents = tokio::fs::read(audio_file).await?;
        let file_name = audio_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(contents).file_name(file_name));

        let endpoint = self.api_url("transcribe");
        debug!("Uploading transcription request to {endpoint}");

        let mut request = self
            .web_client
            .post(&endpoint)
            .header(USERNAME_HEADER, &self.username)
            .multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenAiError::Status { status, endpoint });
        }

        Self::data_of(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GenAiClient {
        GenAiClient::new(
            GenAiConfig {
                api_url: "http://genai:8000/".to_string(),
                username: None,
                token: None,
            },
            Client::new(),
        )
    }

    #[test]
    fn api_urls_are_rooted_under_api() {
        let client = client();
        assert_eq!(client.api_url("tables"), "http://genai:8000/api/tables");
        assert_eq!(
            client.api_url("collection/docs"),
            "http://genai:8000/api/collection/docs"
        );
    }

    #[test]
    fn username_defaults_to_guest() {
        assert_eq!(client().username, "guest");
    }

    #[test]
    fn unset_params_are_pruned() {
        let pruned = GenAiClient::prune_params(vec![
            ("owner", Some("ada".to_string())),
            ("labels", None),
            ("mode", Some("full".to_string())),
        ]);
        assert_eq!(
            pruned,
            vec![
                ("owner".to_string(), "ada".to_string()),
                ("mode".to_string(), "full".to_string()),
            ]
        );
    }

    #[test]
    fn success_envelope_unwraps() {
        assert!(GenAiClient::success_of(json!({"success": true})).unwrap());
        assert!(!GenAiClient::success_of(json!({"success": false})).unwrap());
        assert!(matches!(
            GenAiClient::success_of(json!({"data": []})),
            Err(GenAiError::MissingField("success"))
        ));
    }

    #[test]
    fn data_envelope_unwraps() {
        let data = GenAiClient::data_of(json!({"data": [1, 2, 3]})).unwrap();
        assert_eq!(data, json!([1, 2, 3]));
        assert!(matches!(
            GenAiClient::data_of(json!({"success": true})),
            Err(GenAiError::MissingField("data"))
        ));
    }

    #[test]
    fn pipeline_answer_deserializes_from_the_data_payload() {
        let data = json!({
            "answer": "42",
            "sources": ["doc-1"],
            "returned_state": {"turn": 2},
        });
        let answer: PipelineAnswer = serde_json::from_value(data).unwrap();
        assert_eq!(answer.answer, json!("42"));
        assert_eq!(answer.sources, json!(["doc-1"]));
    }
}
