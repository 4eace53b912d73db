//! Short marketing copy generated by the remote model: taglines, bios, insight blurbs.
//!
//! Generation never fails from the caller's point of view. Every request carries a fixed
//! fallback that is returned when no key is configured, the call fails, or the reply is empty.

use serde::{Deserialize, Serialize};

use crate::config::{self, Config};
use crate::llm::{GeminiClient, GenerateRequest};

/// Visitor segment a tagline is tailored to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Corporate,
    #[default]
    Government,
    Startup,
}

impl Audience {
    pub fn label(self) -> &'static str {
        match self {
            Audience::Corporate => "Corporate",
            Audience::Government => "Government",
            Audience::Startup => "Startup",
        }
    }
}

/// Which configured model a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// The chat model (premium); used for hero taglines.
    Chat,
    /// The fast copy model.
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CopyRequest {
    Tagline {
        #[serde(default)]
        audience: Audience,
    },
    ProjectInsight {
        title: String,
        category: String,
    },
    PoliticalInsight {
        service: String,
    },
    TeamBio {
        name: String,
        role: String,
    },
    MissionInsight,
    TimelineInsight {
        year: String,
        title: String,
    },
    TestimonialSummary {
        client: String,
        review: String,
    },
}

impl CopyRequest {
    pub fn tier(&self) -> ModelTier {
        match self {
            CopyRequest::Tagline { .. } => ModelTier::Chat,
            _ => ModelTier::Copy,
        }
    }

    pub fn prompt(&self) -> String {
        match self {
            CopyRequest::Tagline { audience } => format!(
                "Generate a short, punchy, futuristic tagline (under 10 words) for 'Veth Analytics', a premium Indian IT and Government AI consultancy, tailored for a {} audience. Focus on core offerings like GovTech, AI, and Big Data. Do not include quotes.",
                audience.label()
            ),
            CopyRequest::ProjectInsight { title, category } => format!(
                "Write a single sentence (max 20 words) describing the high-tech impact of a {} project titled \"{}\". Use business-centric, futuristic language.",
                category, title
            ),
            CopyRequest::PoliticalInsight { service } => format!(
                "Write a concise, high-impact strategic insight (max 15 words) about the value of \"{}\" in modern Indian elections. Professional, analytical tone.",
                service
            ),
            CopyRequest::TeamBio { name, role } => format!(
                "Write a professional, premium 2-sentence bio for {}, the {} at a high-end AI consultancy. Emphasize expertise and leadership.",
                name, role
            ),
            CopyRequest::MissionInsight => "Generate a single visionary sentence about the future of AI in governance and society. Abstract and inspiring.".to_string(),
            CopyRequest::TimelineInsight { year, title } => format!(
                "Provide a 2-sentence elaborated context for a corporate milestone: Year {}, Title \"{}\". Professional and impressive tone.",
                year, title
            ),
            CopyRequest::TestimonialSummary { client, review } => format!(
                "Summarize this client review from {} into a single, punchy impact statement (max 12 words) highlighting the outcome. Review: \"{}\"",
                client, review
            ),
        }
    }

    pub fn fallback(&self) -> String {
        match self {
            CopyRequest::Tagline { .. } => "Innovating India Through Technology".to_string(),
            CopyRequest::ProjectInsight { .. } => {
                "Advanced analytics and digital transformation delivered.".to_string()
            }
            CopyRequest::PoliticalInsight { .. } => {
                "Leveraging data to decode voter intent and optimize campaign resources.".to_string()
            }
            CopyRequest::TeamBio { name, role } => format!(
                "{} is a visionary leader in {} with over a decade of experience driving digital transformation.",
                name, role
            ),
            CopyRequest::MissionInsight => {
                "Empowering society through sustainable and scalable artificial intelligence solutions.".to_string()
            }
            CopyRequest::TimelineInsight { year, .. } => format!(
                "A defining moment in {} that solidified our commitment to technological excellence and national growth.",
                year
            ),
            CopyRequest::TestimonialSummary { .. } => {
                "A partnership that delivered exceptional value and scalability.".to_string()
            }
        }
    }
}

/// Generated (or fallback) copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyText {
    pub text: String,
    /// False when `text` is the fixed fallback.
    pub generated: bool,
}

#[derive(Clone)]
pub struct CopyWriter {
    client: Option<GeminiClient>,
    chat_model: String,
    copy_model: String,
}

impl CopyWriter {
    pub fn new(
        client: Option<GeminiClient>,
        chat_model: impl Into<String>,
        copy_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            chat_model: chat_model.into(),
            copy_model: copy_model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = config::resolve_api_key(config)
            .map(|key| GeminiClient::new(key, Some(config::resolve_base_url(config))));
        Self::new(
            client,
            config::resolve_chat_model(config),
            config::resolve_copy_model(config),
        )
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Chat => &self.chat_model,
            ModelTier::Copy => &self.copy_model,
        }
    }

    pub async fn generate(&self, request: &CopyRequest) -> CopyText {
        let fallback = || CopyText {
            text: request.fallback(),
            generated: false,
        };
        let Some(client) = self.client.as_ref() else {
            log::debug!("copy: no api key configured, using fallback");
            return fallback();
        };
        let model = self.model_for(request.tier());
        match client
            .generate(model, &GenerateRequest::prompt(request.prompt()))
            .await
        {
            Ok(text) if !text.trim().is_empty() => CopyText {
                text: text.trim().to_string(),
                generated: true,
            },
            Ok(_) => {
                log::warn!("copy: {} returned empty text, using fallback", model);
                fallback()
            }
            Err(e) => {
                log::warn!("copy: generation with {} failed: {}", model, e);
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_deserialize_from_tagged_json() {
        let r: CopyRequest = serde_json::from_str(r#"{"kind":"tagline"}"#).unwrap();
        assert_eq!(
            r,
            CopyRequest::Tagline {
                audience: Audience::Government
            }
        );
        let r: CopyRequest =
            serde_json::from_str(r#"{"kind":"teamBio","name":"Asha Rao","role":"CTO"}"#).unwrap();
        assert!(matches!(r, CopyRequest::TeamBio { .. }));
        let r: CopyRequest = serde_json::from_str(r#"{"kind":"missionInsight"}"#).unwrap();
        assert_eq!(r, CopyRequest::MissionInsight);
        assert!(serde_json::from_str::<CopyRequest>(r#"{"kind":"haiku"}"#).is_err());
    }

    #[test]
    fn prompts_and_fallbacks_carry_request_fields() {
        let t = CopyRequest::Tagline {
            audience: Audience::Startup,
        };
        assert!(t.prompt().contains("Startup audience"));
        assert_eq!(t.tier(), ModelTier::Chat);

        let bio = CopyRequest::TeamBio {
            name: "Asha Rao".into(),
            role: "Chief Data Officer".into(),
        };
        assert!(bio.prompt().contains("Asha Rao, the Chief Data Officer"));
        assert!(bio.fallback().starts_with("Asha Rao is a visionary leader in Chief Data Officer"));
        assert_eq!(bio.tier(), ModelTier::Copy);

        let m = CopyRequest::TimelineInsight {
            year: "2019".into(),
            title: "First state contract".into(),
        };
        assert!(m.fallback().contains("in 2019"));
    }

    #[tokio::test]
    async fn unconfigured_writer_returns_fallback() {
        let w = CopyWriter::new(None, "chat", "copy");
        let out = w.generate(&CopyRequest::MissionInsight).await;
        assert!(!out.generated);
        assert_eq!(out.text, CopyRequest::MissionInsight.fallback());
    }

    #[tokio::test]
    async fn unreachable_service_returns_fallback() {
        // Nothing listens on port 9 of loopback; the request fails fast.
        let client = GeminiClient::new("key", Some("http://127.0.0.1:9/v1beta".to_string()));
        let w = CopyWriter::new(Some(client), "chat", "copy");
        let req = CopyRequest::PoliticalInsight {
            service: "Booth Management".into(),
        };
        let out = w.generate(&req).await;
        assert!(!out.generated);
        assert_eq!(out.text, req.fallback());
    }
}
