//! Mock compute API for exercising the HTTP client
//!
//! This simulates the provider's instance, status and power endpoints.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coordinator::config::ComputeConfig;

pub const TOKEN: &str = "test-token";

pub struct MockComputeApi {
    pub server: MockServer,
    pub base_url: String,
}

impl MockComputeApi {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    pub fn config(&self) -> ComputeConfig {
        ComputeConfig {
            base_url: self.base_url.clone(),
            api_token: TOKEN.to_string(),
            request_timeout_seconds: 5,
        }
    }

    /// `GET /instances` listing `(id, state)` pairs
    pub async fn mock_instances(&self, instances: &[(&str, &str)]) {
        let instances: Vec<_> = instances
            .iter()
            .map(|(id, state)| json!({ "instance_id": id, "state": state }))
            .collect();

        Mock::given(method("GET"))
            .and(path("/instances"))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "instances": instances })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_instance_state(&self, instance_id: &str, state: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/instances/{}", instance_id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "instance_id": instance_id, "state": state })),
            )
            .mount(&self.server)
            .await;
    }

    /// Status endpoint reporting event codes, newest first
    pub async fn mock_status(&self, instance_id: &str, codes: &[&str]) {
        let events: Vec<_> = codes.iter().map(|code| json!({ "code": code })).collect();
        Mock::given(method("GET"))
            .and(path(format!("/instances/{}/status", instance_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "events": events })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_not_found(&self, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// Power call reply for `action` ("stop" | "start") with the given dry-run flag
    pub async fn mock_power(
        &self,
        instance_id: &str,
        action: &str,
        dry_run: bool,
        status: u16,
        error_code: Option<&str>,
    ) {
        let response = match error_code {
            Some(code) => ResponseTemplate::new(status)
                .set_body_json(json!({ "code": code, "message": format!("{} refused", action) })),
            None => ResponseTemplate::new(status).set_body_json(json!({ "accepted": true })),
        };

        Mock::given(method("POST"))
            .and(path(format!("/instances/{}/{}", instance_id, action)))
            .and(body_json(json!({ "dry_run": dry_run })))
            .respond_with(response)
            .expect(1)
            .mount(&self.server)
            .await;
    }
}
