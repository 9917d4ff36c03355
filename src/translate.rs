use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::assistant::{Assistant, AssistantError, AssistantRequest, Proposal};
use crate::error::{NavigatorError, NavigatorResult};
use crate::query::{
    DEFAULT_LIMIT, DrgFilter, RadiusKm, SafeQuery, Template, Zip5, validate_limit,
};
use crate::scope::{Classification, Constraints};

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Upper bound for one assistant call.
    pub timeout: Duration,
    /// Pause before the single retry of a transient failure.
    pub retry_backoff: Duration,
    /// Row limit when the proposal does not bind one.
    pub default_limit: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(500),
            default_limit: DEFAULT_LIMIT,
        }
    }
}

/// Turns an in-scope question into a [`SafeQuery`] by asking the assistant for
/// a template and bindings, then validating both against the allow-list.
#[derive(Clone)]
pub struct Translator {
    assistant: Arc<dyn Assistant>,
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(assistant: Arc<dyn Assistant>, config: TranslatorConfig) -> Self {
        Self { assistant, config }
    }

    pub fn assistant_name(&self) -> &str {
        self.assistant.name()
    }

    pub async fn translate(
        &self,
        question: &str,
        classification: &Classification,
    ) -> NavigatorResult<SafeQuery> {
        let request = AssistantRequest::new(
            question,
            classification.intent,
            classification.constraints.clone(),
        );
        let proposal = self.propose(&request).await.map_err(|e| match e {
            AssistantError::Malformed(reason) => NavigatorError::rejected(reason),
            other => NavigatorError::TranslationUnavailable {
                reason: other.to_string(),
            },
        })?;
        validate_proposal(&proposal, &classification.constraints, self.config.default_limit)
    }

    /// One attempt, plus one retry after a backoff when the failure is
    /// transient.
    async fn propose(&self, request: &AssistantRequest) -> Result<Proposal, AssistantError> {
        match self.attempt(request).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    assistant = self.assistant.name(),
                    error = %e,
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "assistant call failed; retrying once"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                self.attempt(request).await
            }
            other => other,
        }
    }

    async fn attempt(&self, request: &AssistantRequest) -> Result<Proposal, AssistantError> {
        match tokio::time::timeout(self.config.timeout, self.assistant.propose(request)).await {
            Ok(res) => res,
            Err(_) => Err(AssistantError::Timeout(self.config.timeout)),
        }
    }
}

/// Checks a proposal against the template and parameter allow-lists and
/// binds validated values. Slots the proposal leaves empty fall back to the
/// guard's constraints.
pub fn validate_proposal(
    proposal: &Proposal,
    fallback: &Constraints,
    default_limit: usize,
) -> NavigatorResult<SafeQuery> {
    let template = Template::from_id(proposal.template.trim()).ok_or_else(|| {
        NavigatorError::rejected(format!("template {:?} is not allow-listed", proposal.template))
    })?;

    let bound = BoundParams::from_map(&proposal.params)?;

    let drg = bound
        .drg
        .or_else(|| fallback.drg.clone())
        .map(|s| DrgFilter::parse(&s))
        .transpose()?;
    let zip = bound
        .zip
        .or_else(|| fallback.zip.clone())
        .map(|s| Zip5::parse(&s))
        .transpose()?;
    let radius_km = bound
        .radius_km
        .or(fallback.radius_km)
        .map(RadiusKm::new)
        .transpose()?;
    let limit = match bound.limit {
        Some(n) => validate_limit(Some(n))?,
        None => default_limit,
    };

    Ok(SafeQuery::new(template, drg, zip, radius_km, limit))
}

#[derive(Debug, Default)]
struct BoundParams {
    drg: Option<String>,
    zip: Option<String>,
    radius_km: Option<f64>,
    limit: Option<usize>,
}

impl BoundParams {
    fn from_map(params: &Map<String, Value>) -> NavigatorResult<Self> {
        let mut out = BoundParams::default();
        for (key, value) in params {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "drg" => {
                    out.drg = Some(match value {
                        Value::String(s) => s.clone(),
                        // a bare number is a code; restore the leading zeros
                        Value::Number(n) => match n.as_u64() {
                            Some(code) if code <= 999 => format!("{code:03}"),
                            _ => return Err(type_mismatch(key, value)),
                        },
                        _ => return Err(type_mismatch(key, value)),
                    })
                }
                "zip" => match value {
                    Value::String(s) => out.zip = Some(s.clone()),
                    _ => return Err(type_mismatch(key, value)),
                },
                "radius_km" => match value.as_f64() {
                    Some(km) => out.radius_km = Some(km),
                    None => return Err(type_mismatch(key, value)),
                },
                "limit" => match value.as_u64() {
                    Some(n) => out.limit = Some(n as usize),
                    None => return Err(type_mismatch(key, value)),
                },
                other => {
                    return Err(NavigatorError::rejected(format!(
                        "parameter {other:?} is not allow-listed"
                    )));
                }
            }
        }
        Ok(out)
    }
}

fn type_mismatch(key: &str, value: &Value) -> NavigatorError {
    NavigatorError::rejected(format!("parameter {key:?} has unexpected value {value}"))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::query::GeoScope;
    use crate::scope::Intent;

    struct Scripted {
        replies: Mutex<VecDeque<Result<Proposal, AssistantError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Proposal, AssistantError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Assistant for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn propose(&self, _request: &AssistantRequest) -> Result<Proposal, AssistantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AssistantError::Transport("script exhausted".into())))
        }
    }

    fn proposal(template: &str, params: Value) -> Proposal {
        Proposal {
            template: template.into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    fn classification(constraints: Constraints) -> Classification {
        Classification {
            in_scope: true,
            intent: Intent::Cost,
            constraints,
        }
    }

    fn translator(assistant: Arc<Scripted>) -> Translator {
        Translator::new(
            assistant,
            TranslatorConfig {
                timeout: Duration::from_millis(50),
                retry_backoff: Duration::from_millis(1),
                default_limit: 25,
            },
        )
    }

    #[test]
    fn valid_proposal_binds_typed_parameters() {
        let p = proposal(
            "quality_ranking",
            json!({"drg": 23, "zip": "36301", "radius_km": 40, "limit": 5}),
        );
        let q = validate_proposal(&p, &Constraints::default(), 25).unwrap();
        assert_eq!(q.template, Template::QualityRanking);
        assert_eq!(q.drg.unwrap().as_str(), "023");
        assert_eq!(q.limit, 5);
        match q.geo {
            GeoScope::Radius { zip, radius_km } => {
                assert_eq!(zip.as_str(), "36301");
                assert_eq!(radius_km.get(), 40.0);
            }
            other => panic!("unexpected geo scope {other:?}"),
        }
    }

    #[test]
    fn empty_slots_fall_back_to_guard_constraints() {
        let p = proposal("cost_ranking", json!({"drg": "470", "zip": null}));
        let fallback = Constraints {
            drg: Some("999".into()),
            zip: Some("10001".into()),
            radius_km: None,
        };
        let q = validate_proposal(&p, &fallback, 25).unwrap();
        assert_eq!(q.drg.unwrap().as_str(), "470");
        assert_eq!(q.geo, GeoScope::ExactZip(Zip5::parse("10001").unwrap()));
        assert_eq!(q.limit, 25);
    }

    #[test]
    fn unknown_templates_and_keys_are_rejected() {
        let cases = [
            proposal("raw_sql", json!({})),
            proposal("cost_ranking", json!({"sql": "DROP TABLE providers"})),
            proposal("cost_ranking", json!({"table": "ratings"})),
            proposal("cost_ranking", json!({"zip": 10001})),
            proposal("cost_ranking", json!({"radius_km": "far"})),
            proposal("cost_ranking", json!({"drg": ["470"]})),
        ];
        for p in cases {
            let err = validate_proposal(&p, &Constraints::default(), 25).unwrap_err();
            assert!(
                matches!(err, NavigatorError::TranslationRejected { .. }),
                "{p:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn malformed_values_name_the_field() {
        let err = validate_proposal(
            &proposal("cost_ranking", json!({"zip": "1234"})),
            &Constraints::default(),
            25,
        )
        .unwrap_err();
        assert!(matches!(err, NavigatorError::InvalidParameter { field: "zip", .. }));

        let err = validate_proposal(
            &proposal("cost_ranking", json!({"radius_km": -5})),
            &Constraints::default(),
            25,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NavigatorError::InvalidParameter {
                field: "radius_km",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let assistant = Scripted::new(vec![
            Err(AssistantError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            }),
            Ok(proposal("cost_ranking", json!({"drg": "470"}))),
        ]);
        let t = translator(assistant.clone());
        let q = t
            .translate("q", &classification(Constraints::default()))
            .await
            .unwrap();
        assert_eq!(q.drg.unwrap().as_str(), "470");
        assert_eq!(assistant.calls(), 2);
    }

    #[tokio::test]
    async fn repeated_transient_failure_is_unavailable() {
        let assistant = Scripted::new(vec![
            Err(AssistantError::Transport("connection refused".into())),
            Err(AssistantError::Transport("connection refused".into())),
            Ok(proposal("cost_ranking", json!({}))),
        ]);
        let t = translator(assistant.clone());
        let err = t
            .translate("q", &classification(Constraints::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::TranslationUnavailable { .. }));
        assert_eq!(assistant.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_proposal_is_rejected_without_retry() {
        let assistant = Scripted::new(vec![
            Err(AssistantError::Malformed("not json".into())),
            Ok(proposal("cost_ranking", json!({}))),
        ]);
        let t = translator(assistant.clone());
        let err = t
            .translate("q", &classification(Constraints::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::TranslationRejected { .. }));
        assert_eq!(assistant.calls(), 1);
    }

    #[tokio::test]
    async fn validation_rejection_is_not_retried() {
        let assistant = Scripted::new(vec![
            Ok(proposal("delete_everything", json!({}))),
            Ok(proposal("cost_ranking", json!({}))),
        ]);
        let t = translator(assistant.clone());
        let err = t
            .translate("q", &classification(Constraints::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::TranslationRejected { .. }));
        assert_eq!(assistant.calls(), 1);
    }

    #[tokio::test]
    async fn slow_assistant_times_out() {
        let assistant = Scripted::slow(Duration::from_secs(5));
        let t = translator(assistant.clone());
        let err = t
            .translate("q", &classification(Constraints::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::TranslationUnavailable { .. }));
        assert_eq!(assistant.calls(), 2);
    }
}
