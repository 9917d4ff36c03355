use serde::Serialize;

use crate::error::{NavigatorError, NavigatorResult};
use crate::model::ProviderPriceRating;
use crate::query::{SafeQuery, Template};
use crate::ranking::RankingEngine;
use crate::scope::ScopeGuard;
use crate::translate::Translator;

pub const OUT_OF_SCOPE_MESSAGE: &str = "I can only answer questions about hospital procedure \
     costs and provider ratings. Try, for example: 'Who is cheapest for DRG 470 within 25 miles \
     of 10001?'";

pub const REJECTED_MESSAGE: &str = "I couldn't turn that into a supported provider search. Try \
     naming a DRG code or procedure, a ZIP code, and whether you want the cheapest or the \
     best-rated providers.";

pub const UNAVAILABLE_MESSAGE: &str = "The question assistant is temporarily unavailable. Please \
     try again shortly, or search providers directly.";

pub const NO_MATCH_MESSAGE: &str = "No providers matched your question.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundedAnswer {
    pub text: String,
    pub rows: Vec<ProviderPriceRating>,
    pub is_out_of_scope: bool,
}

impl GroundedAnswer {
    fn refusal(text: &str, is_out_of_scope: bool) -> Self {
        Self {
            text: text.to_string(),
            rows: Vec::new(),
            is_out_of_scope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Classified,
    Rejected,
    Translated,
    Executed,
    Formatted,
}

/// Answers free-text questions: scope guard, then translation, then the
/// ranking engine's own read path, then a summary of the returned rows.
#[derive(Clone)]
pub struct GroundedExecutor {
    guard: ScopeGuard,
    translator: Translator,
    engine: RankingEngine,
}

impl GroundedExecutor {
    pub fn new(guard: ScopeGuard, translator: Translator, engine: RankingEngine) -> Self {
        Self {
            guard,
            translator,
            engine,
        }
    }

    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    pub async fn answer(&self, question: &str) -> NavigatorResult<GroundedAnswer> {
        let question = question.trim();
        trace_stage(Stage::Received);
        if question.is_empty() {
            return Err(NavigatorError::invalid("question", "must not be empty"));
        }

        let classification = self.guard.classify(question);
        trace_stage(Stage::Classified);
        if !classification.in_scope {
            trace_stage(Stage::Rejected);
            return Ok(GroundedAnswer::refusal(OUT_OF_SCOPE_MESSAGE, true));
        }

        let query = match self.translator.translate(question, &classification).await {
            Ok(q) => q,
            Err(NavigatorError::TranslationRejected { reason }) => {
                tracing::warn!(
                    assistant = self.translator.assistant_name(),
                    %reason,
                    "translation rejected"
                );
                trace_stage(Stage::Rejected);
                return Ok(GroundedAnswer::refusal(REJECTED_MESSAGE, false));
            }
            Err(e) => return Err(e),
        };
        trace_stage(Stage::Translated);

        let rows = self.engine.execute(&query)?;
        trace_stage(Stage::Executed);

        let text = summarize(&query, &rows);
        trace_stage(Stage::Formatted);
        Ok(GroundedAnswer {
            text,
            rows,
            is_out_of_scope: false,
        })
    }
}

fn trace_stage(stage: Stage) {
    tracing::debug!(?stage, "answer pipeline");
}

/// Renders the answer from the returned rows only.
fn summarize(query: &SafeQuery, rows: &[ProviderPriceRating]) -> String {
    let Some(top) = rows.first() else {
        return NO_MATCH_MESSAGE.to_string();
    };

    let charges = match top.avg_covered_charges {
        Some(v) => format!("avg covered charges of {}", format_usd(v)),
        None => "avg covered charges not reported".to_string(),
    };
    let rating = match top.rating {
        Some(r) => format!("a rating of {}/10", r.get()),
        None => "no rating on file".to_string(),
    };
    let (lead, details) = match query.template {
        Template::CostRanking => ("Cheapest", format!("{charges} and {rating}")),
        Template::QualityRanking => ("Best rated", format!("{rating} and {charges}")),
    };

    let mut text = format!(
        "{lead} for DRG {} ({}): {} in {}, with {details}",
        top.ms_drg_code,
        top.ms_drg_description,
        top.provider_name,
        location(top)
    );
    if let Some(km) = top.distance_km {
        text.push_str(&format!(", {km:.1} km from the searched ZIP"));
    }
    text.push('.');
    if rows.len() > 1 {
        text.push_str(&format!(" {} matching results found.", rows.len()));
    }
    text
}

fn location(row: &ProviderPriceRating) -> String {
    let place = [row.city.as_deref(), row.state.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if place.is_empty() {
        row.zip.clone()
    } else {
        format!("{place} {}", row.zip)
    }
}

/// `$1,234,567.89`
pub fn format_usd(v: f64) -> String {
    let cents = (v.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rating;

    fn row(id: &str, charges: Option<f64>, rating: Option<i64>) -> ProviderPriceRating {
        ProviderPriceRating {
            provider_id: id.into(),
            provider_name: format!("Hospital {id}"),
            city: Some("NEW YORK".into()),
            state: Some("NY".into()),
            zip: "10001".into(),
            ms_drg_code: "470".into(),
            ms_drg_description: "MAJOR JOINT REPLACEMENT".into(),
            total_discharges: Some(10),
            avg_covered_charges: charges,
            avg_total_payments: None,
            avg_medicare_payments: None,
            rating: rating.map(|r| Rating::new(r).unwrap()),
            distance_km: None,
        }
    }

    fn query(template: Template) -> SafeQuery {
        SafeQuery::new(template, None, None, None, 10)
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(999.5), "$999.50");
        assert_eq!(format_usd(120000.0), "$120,000.00");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
    }

    #[test]
    fn cost_summary_names_the_top_row() {
        let mut top = row("330001", Some(120000.0), Some(7));
        top.distance_km = Some(2.345);
        let rows = vec![top, row("330002", Some(130000.0), None)];
        let text = summarize(&query(Template::CostRanking), &rows);
        assert_eq!(
            text,
            "Cheapest for DRG 470 (MAJOR JOINT REPLACEMENT): Hospital 330001 in NEW YORK, NY \
             10001, with avg covered charges of $120,000.00 and a rating of 7/10, 2.3 km from \
             the searched ZIP. 2 matching results found."
        );
    }

    #[test]
    fn quality_summary_leads_with_rating() {
        let rows = vec![row("330003", None, None)];
        let text = summarize(&query(Template::QualityRanking), &rows);
        assert_eq!(
            text,
            "Best rated for DRG 470 (MAJOR JOINT REPLACEMENT): Hospital 330003 in NEW YORK, NY \
             10001, with no rating on file and avg covered charges not reported."
        );
    }

    #[test]
    fn empty_rows_say_nothing_was_found() {
        assert_eq!(summarize(&query(Template::CostRanking), &[]), NO_MATCH_MESSAGE);
    }
}
