use crate::error::{InsightsError, Result};
use crate::llm::client::GeminiClient;
use crate::llm::prompts::{analysis_instructions, document_manifest, SYSTEM_PROMPT_STATEMENT_ANALYSIS};
use crate::llm::types::*;
use crate::metrics::compute_value;
use crate::schema::{Period, PeriodSummary, SpendingReport, StatementAnalysis};
use futures::future;
use log::{info, warn};
use serde_json::Value;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub model: String,
    /// Files at or below this size are sent inline; larger ones go through
    /// the Files API. `0` uploads everything.
    pub inline_limit_bytes: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            inline_limit_bytes: 0,
        }
    }
}

pub struct StatementAnalyzer {
    client: GeminiClient,
    settings: AnalyzerSettings,
    system_prompt: String,
}

impl StatementAnalyzer {
    pub fn new(client: GeminiClient, settings: AnalyzerSettings) -> Self {
        Self {
            client,
            settings,
            system_prompt: SYSTEM_PROMPT_STATEMENT_ANALYSIS.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub async fn analyze(&self, files: &[StatementFile]) -> Result<SpendingReport> {
        if files.is_empty() {
            return Err(InsightsError::InvalidUpload(
                "No statements provided".to_string(),
            ));
        }

        info!(
            "Analyzing {} statement(s) with {}",
            files.len(),
            self.settings.model
        );

        let sources = self.prepare_sources(files).await?;
        let response = self.request_analysis(&sources).await;
        self.cleanup(&sources).await;

        build_report(&response?)
    }

    async fn prepare_sources(&self, files: &[StatementFile]) -> Result<Vec<StatementSource>> {
        let prepared = files.iter().map(|file| async move {
            if file.len() <= self.settings.inline_limit_bytes {
                Ok(StatementSource::inline(file))
            } else {
                self.client
                    .upload_document(file)
                    .await
                    .map(StatementSource::Uploaded)
            }
        });

        let mut sources = Vec::with_capacity(files.len());
        let mut first_error = None;
        for result in future::join_all(prepared).await {
            match result {
                Ok(source) => sources.push(source),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!("Additional statement failed to prepare: {}", e),
            }
        }

        match first_error {
            Some(e) => {
                self.cleanup(&sources).await;
                Err(e)
            }
            None => Ok(sources),
        }
    }

    async fn request_analysis(&self, sources: &[StatementSource]) -> Result<String> {
        let manifest = document_manifest(sources.iter().map(StatementSource::display_name));
        let messages = vec![Content::user_with_statements(
            analysis_instructions(&manifest),
            sources,
        )];

        self.client
            .generate_content(
                &self.settings.model,
                &self.system_prompt,
                messages,
                Some(StatementAnalysis::response_schema()?),
            )
            .await
    }

    async fn cleanup(&self, sources: &[StatementSource]) {
        let deletions = sources
            .iter()
            .filter_map(StatementSource::remote)
            .map(|doc| async move {
                if let Err(e) = self.client.delete_document(doc).await {
                    warn!("Could not delete remote file {}: {}", doc.name, e);
                }
            });

        future::join_all(deletions).await;
    }
}

/// Parses the model's reply and recalculates each period independently.
///
/// A period the recalculator rejects is replaced by an empty summary so the
/// remaining periods are still delivered.
pub fn build_report(raw: &str) -> Result<SpendingReport> {
    let cleaned = clean_json_output(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        InsightsError::ExtractionFailed(format!("Model returned invalid JSON: {}", e))
    })?;

    if !value.is_object() {
        return Err(InsightsError::ExtractionFailed(
            "Model response is not a JSON object".to_string(),
        ));
    }

    let fallback_currency = Period::ALL
        .iter()
        .find_map(|p| currency_of(value.get(p.as_str())?))
        .unwrap_or_default();

    let summarize = |period: Period| {
        let raw = value.get(period.as_str()).unwrap_or(&Value::Null);
        match compute_value(raw) {
            Some(mut summary) => {
                if summary.period.is_empty() {
                    summary.period = period.to_string();
                }
                summary
            }
            None => {
                warn!("Model returned no usable {} period, substituting an empty one", period);
                PeriodSummary::empty(
                    period.as_str(),
                    currency_of(raw).unwrap_or_else(|| fallback_currency.clone()),
                )
            }
        }
    };

    Ok(SpendingReport {
        weekly: summarize(Period::Weekly),
        monthly: summarize(Period::Monthly),
        yearly: summarize(Period::Yearly),
    })
}

fn currency_of(period: &Value) -> Option<String> {
    period
        .get("currency")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn clean_json_output(raw: &str) -> String {
    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    raw.trim().to_string()
}
