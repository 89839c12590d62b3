use crate::error::{InsightsError, Result};
use crate::llm::polling::{poll_until, PollPolicy, PollStatus};
use crate::llm::types::*;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::json;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    upload_url: String,
    poll_policy: PollPolicy,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            upload_url: GEMINI_UPLOAD_URL.to_string(),
            poll_policy: PollPolicy::default(),
        }
    }

    /// Points the client at another host, e.g. a mock server in tests.
    pub fn with_base_urls(mut self, base_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.upload_url = upload_url.into();
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub async fn upload_document(&self, file: &StatementFile) -> Result<RemoteDocument> {
        let file_size = file.len();
        let start_url = format!("{}?key={}", self.upload_url, self.api_key);
        let metadata = json!({ "file": { "display_name": file.file_name } });

        debug!("Starting upload of '{}' ({} bytes)", file.file_name, file_size);

        let init_res = self
            .client
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", file_size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", &file.mime_type)
            .header("Content-Type", "application/json")
            .json(&metadata)
            .send()
            .await?;

        let init_status = init_res.status();
        if !init_status.is_success() {
            let error_text = init_res.text().await?;
            return Err(InsightsError::ExtractionFailed(format!(
                "Upload init failed (status {}): {}",
                init_status, error_text
            )));
        }

        let upload_url = init_res
            .headers()
            .get("x-goog-upload-url")
            .ok_or_else(|| InsightsError::ExtractionFailed("No upload URL in headers".to_string()))?
            .to_str()
            .map_err(|e| InsightsError::ExtractionFailed(e.to_string()))?
            .to_string();

        let upload_res = self
            .client
            .post(&upload_url)
            .header("Content-Length", file_size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(file.bytes.clone())
            .send()
            .await?;

        let upload_status = upload_res.status();
        if !upload_status.is_success() {
            let error_text = upload_res.text().await?;
            return Err(InsightsError::ExtractionFailed(format!(
                "File upload failed (status {}): {}",
                upload_status, error_text
            )));
        }

        let upload_body: serde_json::Value = upload_res.json().await?;
        let file_obj = upload_body.get("file").cloned().ok_or_else(|| {
            InsightsError::ExtractionFailed("Upload response missing 'file'".to_string())
        })?;
        let uploaded: FileResource = serde_json::from_value(file_obj)?;
        let remote_name = uploaded.name.clone();

        let activated = if file_status(&uploaded) == FileState::Active {
            Ok(uploaded)
        } else {
            let label = format!("file '{}'", file.file_name);
            poll_until(&label, &self.poll_policy, || self.check_file(&remote_name)).await
        };

        let resource = match activated.and_then(|r| {
            if r.uri.is_empty() {
                Err(InsightsError::ExtractionFailed(
                    "Upload response missing uri".to_string(),
                ))
            } else {
                Ok(r)
            }
        }) {
            Ok(resource) => resource,
            Err(e) => {
                // the file already exists remotely even though it is unusable
                if !remote_name.is_empty() {
                    if let Err(delete_err) = self.delete_file(&remote_name).await {
                        warn!("Could not delete remote file {}: {}", remote_name, delete_err);
                    }
                }
                return Err(e);
            }
        };

        info!("Uploaded '{}' as {}", file.file_name, resource.name);

        Ok(RemoteDocument {
            uri: resource.uri,
            name: resource.name,
            display_name: file.file_name.clone(),
            mime_type: resource.mime_type.unwrap_or_else(|| file.mime_type.clone()),
            state: "ACTIVE".to_string(),
        })
    }

    async fn check_file(&self, name: &str) -> Result<PollStatus<FileResource>> {
        let check_url = format!("{}/{}?key={}", self.base_url, name, self.api_key);
        let check_res = self.client.get(&check_url).send().await?;

        let status = check_res.status();
        if !status.is_success() {
            let error_text = check_res.text().await?;
            return Err(InsightsError::ExtractionFailed(format!(
                "File status check failed (status {}): {}",
                status, error_text
            )));
        }

        let check_json: serde_json::Value = check_res.json().await?;
        let file_obj = check_json.get("file").unwrap_or(&check_json).clone();
        let resource: FileResource = serde_json::from_value(file_obj)?;

        Ok(match file_status(&resource) {
            FileState::Active => PollStatus::Ready(resource),
            FileState::Failed => PollStatus::Failed(
                resource
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Google failed to process the file".to_string()),
            ),
            FileState::Pending => {
                PollStatus::Pending(resource.state.unwrap_or_else(|| "PROCESSING".to_string()))
            }
        })
    }

    pub async fn delete_document(&self, document: &RemoteDocument) -> Result<()> {
        self.delete_file(&document.name).await
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let url = format!("{}/{}?key={}", self.base_url, name, self.api_key);
        let res = self.client.delete(&url).send().await?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res.text().await?;
            return Err(InsightsError::ExtractionFailed(format!(
                "Delete of {} failed (status {}): {}",
                name, status, error_text
            )));
        }

        debug!("Deleted remote file {}", name);
        Ok(())
    }

    pub async fn generate_content(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::system(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(InsightsError::ExtractionFailed(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(InsightsError::ExtractionFailed(format!(
                "Prompt was blocked: {}",
                reason
            )));
        }

        let candidate = body
            .candidates
            .ok_or_else(|| InsightsError::ExtractionFailed("No candidates returned".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| InsightsError::ExtractionFailed("Empty candidates list".to_string()))?;

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        if parts.is_empty() {
            return Err(InsightsError::ExtractionFailed(format!(
                "No parts in content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let text: String = parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(InsightsError::ExtractionFailed(
                "Model returned non-text content".to_string(),
            ));
        }

        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Active,
    Failed,
    Pending,
}

fn file_status(resource: &FileResource) -> FileState {
    match resource.state.as_deref() {
        Some("ACTIVE") => FileState::Active,
        Some("FAILED") => FileState::Failed,
        _ => FileState::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key")
            .with_base_urls(
                format!("{}/v1beta", server.uri()),
                format!("{}/upload/v1beta/files", server.uri()),
            )
            .with_poll_policy(PollPolicy::fixed(Duration::from_millis(1), 3))
    }

    fn statement() -> StatementFile {
        StatementFile::from_upload("march.pdf", Some(PDF_MIME_TYPE), b"%PDF-1.4 test".to_vec())
            .unwrap()
    }

    async fn expect_delete(server: &MockServer, times: u64) {
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc123"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(times)
            .mount(server)
            .await;
    }

    async fn mount_upload(server: &MockServer, state: &str) {
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(query_param("key", "test-key"))
            .and(header("X-Goog-Upload-Command", "start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-goog-upload-url", format!("{}/upload-session", server.uri())),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc123",
                    "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                    "mimeType": "application/pdf",
                    "state": state
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_upload_polls_until_active() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;

        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/abc123",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                "mimeType": "application/pdf",
                "state": "ACTIVE"
            })))
            .expect(1)
            .mount(&server)
            .await;
        expect_delete(&server, 0).await;

        let doc = client_for(&server).upload_document(&statement()).await.unwrap();

        assert!(doc.is_active());
        assert_eq!(doc.name, "files/abc123");
        assert_eq!(doc.display_name, "march.pdf");
        assert_eq!(doc.mime_type, PDF_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_upload_times_out_when_never_active() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;

        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/abc123",
                "state": "PROCESSING"
            })))
            .expect(3)
            .mount(&server)
            .await;
        expect_delete(&server, 1).await;

        let err = client_for(&server)
            .upload_document(&statement())
            .await
            .unwrap_err();

        assert!(matches!(err, InsightsError::Timeout { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_upload_fails_when_processing_fails() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;

        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": { "name": "files/abc123", "state": "FAILED" }
            })))
            .mount(&server)
            .await;
        expect_delete(&server, 1).await;

        let err = client_for(&server)
            .upload_document(&statement())
            .await
            .unwrap_err();

        assert!(matches!(err, InsightsError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn test_upload_skips_polling_when_already_active() {
        let server = MockServer::start().await;
        mount_upload(&server, "ACTIVE").await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let doc = client_for(&server).upload_document(&statement()).await.unwrap();
        assert_eq!(doc.uri, "https://generativelanguage.googleapis.com/v1beta/files/abc123");
    }

    #[tokio::test]
    async fn test_generate_content_returns_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "{\"ok\":" }, { "text": "true}" }] },
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server)
            .generate_content("gemini-test", "system", vec![Content::user("hi")], None)
            .await
            .unwrap();

        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_generate_content_surfaces_api_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate_content("gemini-test", "system", vec![Content::user("hi")], None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_generate_content_reports_blocked_prompt() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate_content("gemini-test", "system", vec![Content::user("hi")], None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_delete_document() {
        let server = MockServer::start().await;
        expect_delete(&server, 1).await;

        let doc = RemoteDocument {
            uri: "uri".to_string(),
            name: "files/abc123".to_string(),
            display_name: "march.pdf".to_string(),
            mime_type: PDF_MIME_TYPE.to_string(),
            state: "ACTIVE".to_string(),
        };

        client_for(&server).delete_document(&doc).await.unwrap();
    }
}
