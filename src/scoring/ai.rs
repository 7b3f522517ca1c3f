//! AI scorer over an OpenAI-style chat completions API
//!
//! Degrades in two steps: a completion that is not strict JSON goes through a
//! regex extraction of the two sub-scores, and a failed call falls back to the
//! deterministic scorer entirely.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::model::Company;
use crate::scoring::{
    heuristic_score, ScoreBreakdown, Scorer, ACQUISITION_WEIGHT, DISPOSAL_WEIGHT,
};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are an M&A analyst specialized in French accounting firms. \
Reply with a single JSON object, no prose.";

/// Chat-completions scorer with deterministic fallback
pub struct AiScorer {
    client: Client,
    api_key: String,
    model: String,
}

impl AiScorer {
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
        }
    }

    async fn request_score(&self, company: &Company) -> Result<ScoreBreakdown> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            temperature: f64,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChatChoiceMessage {
            content: String,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        let prompt = build_prompt(company);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 500,
        };

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Source(format!(
                "Completions API error {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| AppError::Source("Empty completion".to_string()))?;

        parse_completion(content)
            .ok_or_else(|| AppError::Source("Unparseable completion".to_string()))
    }
}

#[async_trait]
impl Scorer for AiScorer {
    async fn score(&self, company: &Company) -> ScoreBreakdown {
        match self.request_score(company).await {
            Ok(breakdown) => breakdown,
            Err(e) => {
                warn!(
                    "AI scoring failed for {} ({}); using heuristic scorer",
                    company.siren, e
                );
                heuristic_score(company)
            }
        }
    }
}

fn build_prompt(company: &Company) -> String {
    fn fmt_amount(value: Option<f64>) -> String {
        value
            .map(|v| format!("{:.0} EUR", v))
            .unwrap_or_else(|| "unknown".to_string())
    }

    format!(
        "Score this French accounting firm as an M&A prospect.\n\
         Name: {}\n\
         SIREN: {}\n\
         Legal form: {}\n\
         Created on: {}\n\
         Annual revenue: {}\n\
         Net income: {}\n\
         Headcount: {}\n\
         Share capital: {}\n\
         Address: {}\n\n\
         Return JSON with keys: acquisition_score (0-100), disposal_score (0-100), \
         overall_score, rationale, positive_factors (array), negative_factors (array), \
         recommendations (array).",
        company.legal_name,
        company.siren,
        company.legal_form.as_deref().unwrap_or("unknown"),
        company
            .created_on
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        fmt_amount(company.annual_revenue),
        fmt_amount(company.net_income),
        company
            .headcount
            .map(|h| h.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        fmt_amount(company.share_capital),
        company.address.as_deref().unwrap_or("unknown"),
    )
}

/// Parse a completion: strict JSON first, then a regex pass over free text.
fn parse_completion(content: &str) -> Option<ScoreBreakdown> {
    #[derive(Deserialize)]
    struct AiScore {
        acquisition_score: f64,
        disposal_score: f64,
        overall_score: Option<f64>,
        #[serde(default)]
        rationale: String,
        #[serde(default)]
        positive_factors: Vec<String>,
        #[serde(default)]
        negative_factors: Vec<String>,
        #[serde(default)]
        recommendations: Vec<String>,
    }

    let trimmed = content.trim();
    if let Ok(score) = serde_json::from_str::<AiScore>(trimmed) {
        let acquisition = score.acquisition_score.clamp(0.0, 100.0);
        let disposal = score.disposal_score.clamp(0.0, 100.0);
        let overall = score
            .overall_score
            .unwrap_or(ACQUISITION_WEIGHT * acquisition + DISPOSAL_WEIGHT * disposal)
            .clamp(0.0, 100.0);
        return Some(ScoreBreakdown {
            acquisition_score: acquisition,
            disposal_score: disposal,
            overall_score: overall,
            rationale: score.rationale,
            positive_factors: score.positive_factors,
            negative_factors: score.negative_factors,
            recommendations: score.recommendations,
        });
    }

    debug!("Completion is not strict JSON, extracting scores from text");

    static ACQUISITION_RE: OnceLock<Regex> = OnceLock::new();
    static DISPOSAL_RE: OnceLock<Regex> = OnceLock::new();
    let acquisition_re = ACQUISITION_RE.get_or_init(|| {
        Regex::new(r#"acquisition_score["\s:]+(\d+)"#).expect("static regex is valid")
    });
    let disposal_re = DISPOSAL_RE.get_or_init(|| {
        Regex::new(r#"disposal_score["\s:]+(\d+)"#).expect("static regex is valid")
    });

    let acquisition: f64 = acquisition_re
        .captures(trimmed)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    let disposal: f64 = disposal_re.captures(trimmed)?.get(1)?.as_str().parse().ok()?;

    let acquisition = acquisition.clamp(0.0, 100.0);
    let disposal = disposal.clamp(0.0, 100.0);
    let excerpt: String = trimmed.chars().take(200).collect();

    Some(ScoreBreakdown {
        acquisition_score: acquisition,
        disposal_score: disposal,
        overall_score: ACQUISITION_WEIGHT * acquisition + DISPOSAL_WEIGHT * disposal,
        rationale: excerpt,
        positive_factors: vec![],
        negative_factors: vec![],
        recommendations: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_strict_json() {
        let content = r#"{
            "acquisition_score": 82,
            "disposal_score": 45,
            "overall_score": 59.8,
            "rationale": "Solid revenue base",
            "positive_factors": ["Revenue above €25M"],
            "negative_factors": [],
            "recommendations": ["Priority contact"]
        }"#;

        let breakdown = parse_completion(content).unwrap();
        assert_eq!(breakdown.acquisition_score, 82.0);
        assert_eq!(breakdown.disposal_score, 45.0);
        assert_eq!(breakdown.overall_score, 59.8);
        assert_eq!(breakdown.positive_factors.len(), 1);
    }

    #[test]
    fn test_parse_completion_recomputes_missing_overall() {
        let content = r#"{"acquisition_score": 80, "disposal_score": 50}"#;
        let breakdown = parse_completion(content).unwrap();
        assert_eq!(breakdown.overall_score, 0.4 * 80.0 + 0.6 * 50.0);
    }

    #[test]
    fn test_parse_completion_regex_fallback() {
        let content = "Based on the figures, acquisition_score: 75 and disposal_score: 40. \
                       The firm shows healthy margins.";
        let breakdown = parse_completion(content).unwrap();
        assert_eq!(breakdown.acquisition_score, 75.0);
        assert_eq!(breakdown.disposal_score, 40.0);
        assert_eq!(breakdown.overall_score, 0.4 * 75.0 + 0.6 * 40.0);
        assert!(breakdown.rationale.contains("acquisition_score"));
    }

    #[test]
    fn test_parse_completion_clamps_out_of_range_scores() {
        let content = r#"{"acquisition_score": 130, "disposal_score": 50}"#;
        let breakdown = parse_completion(content).unwrap();
        assert_eq!(breakdown.acquisition_score, 100.0);
    }

    #[test]
    fn test_parse_completion_rejects_garbage() {
        assert!(parse_completion("the model is unsure").is_none());
        assert!(parse_completion("").is_none());
    }

    #[test]
    fn test_build_prompt_includes_financials() {
        let mut company = crate::scoring::tests::company_fixture();
        company.annual_revenue = Some(8_000_000.0);
        let prompt = build_prompt(&company);
        assert!(prompt.contains("Cabinet Martin"));
        assert!(prompt.contains("8000000 EUR"));
        assert!(prompt.contains("acquisition_score"));
    }
}
