use regex::Regex;
use serde::Serialize;

use crate::geo::KM_PER_MILE;

/// Words that only show up when someone asks about hospital care.
const STRONG_TERMS: &[&str] = &[
    "drg", "ms-drg", "hospital", "hospitals", "provider", "providers", "procedure",
    "procedures", "surgery", "surgeries", "surgical", "medicare", "medicaid", "clinic", "clinics",
    "physician", "physicians", "diagnosis", "admission", "inpatient", "outpatient",
    "transplant", "craniotomy", "pneumonia", "sepsis", "septicemia", "cardiac", "renal",
    "childbirth", "angioplasty", "arthroplasty",
];

/// Medical words with everyday meanings ("joint", "delivery", "patient").
/// Alone they never decide scope.
const WEAK_TERMS: &[&str] = &[
    "medical", "operation", "treatment", "treatments", "patient", "patients", "doctor",
    "doctors", "discharge", "discharges", "replacement", "implant", "heart", "knee", "hip",
    "joint", "spine", "spinal", "stroke", "fracture", "kidney", "respiratory", "chest",
    "infection", "bypass", "stent", "delivery", "failure",
];

const COST_TERMS: &[&str] = &[
    "cheap", "cheaper", "cheapest", "cost", "costs", "costly", "price", "prices", "pricing",
    "priced", "charge", "charges", "charged", "expensive", "affordable", "afford", "lowest",
    "least", "bill", "billed", "payment", "payments", "pay", "paid", "fee", "fees", "spend",
];

const QUALITY_TERMS: &[&str] = &[
    "best", "rated", "rating", "ratings", "quality", "top", "highest", "reputation", "review",
    "reviews", "score", "scores", "safest", "better",
];

/// Words that can follow "for" without naming a procedure.
const GENERIC_WORDS: &[&str] = &[
    "a", "an", "the", "hospital", "hospitals", "provider", "providers", "procedure",
    "procedures", "care", "treatment", "surgery", "me", "my", "someone", "patients", "people",
    "cheap", "cheapest", "best", "price", "prices", "cost", "costs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Cost,
    Quality,
    Unknown,
}

/// Best-effort filters pulled out of a question. Missing slots are normal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub in_scope: bool,
    pub intent: Intent,
    pub constraints: Constraints,
}

/// Decides whether a question is about provider costs or quality and pulls
/// out the DRG, ZIP and radius it mentions.
#[derive(Debug, Clone)]
pub struct ScopeGuard {
    drg_code: Regex,
    zip: Regex,
    anchored_zip: Regex,
    radius: Regex,
    description: Regex,
}

impl Default for ScopeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeGuard {
    pub fn new() -> Self {
        Self {
            drg_code: Regex::new(r"(?i)\b(?:ms-?)?drg\s*(?:code\s*)?#?\s*(\d{1,3})\b")
                .expect("static drg pattern"),
            zip: Regex::new(r"\b(\d{5})(?:-\d{4})?\b").expect("static zip pattern"),
            anchored_zip: Regex::new(
                r"(?i)\b(?:of|near|in|around|from|zip(?:\s*code)?)\s*:?\s*(\d{5})(?:-\d{4})?\b",
            )
            .expect("static anchored zip pattern"),
            radius: Regex::new(
                r"(?i)\b(\d+(?:\.\d+)?)\s*(miles?|mi|kilometers?|kilometres?|kms?)\b",
            )
            .expect("static radius pattern"),
            description: Regex::new(
                r"(?i)\bfor\s+([a-z][a-z /&'-]*?[a-z])\s*(?:\b(?:near|in|within|around|close|by|at|from)\b|[?.!,;]|$)",
            )
            .expect("static description pattern"),
        }
    }

    pub fn classify(&self, question: &str) -> Classification {
        let words: Vec<String> = question
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let has = |terms: &[&str]| words.iter().any(|w| terms.contains(&w.as_str()));
        let strong = has(STRONG_TERMS);
        let weak = distinct_hits(&words, WEAK_TERMS);
        let cost = has(COST_TERMS);
        let quality = has(QUALITY_TERMS);

        let constraints = self.extract(question);
        let located = constraints.zip.is_some() || constraints.radius_km.is_some();
        let coded = self.drg_code.is_match(question);

        let asks = cost || quality;
        let in_scope = coded || strong || weak >= 2 || (asks && located);
        let intent = if cost {
            Intent::Cost
        } else if quality {
            Intent::Quality
        } else {
            Intent::Unknown
        };

        Classification {
            in_scope,
            intent,
            constraints,
        }
    }

    pub fn extract(&self, question: &str) -> Constraints {
        let drg_code = self
            .drg_code
            .captures(question)
            .and_then(|c| c.get(1))
            .map(|m| format!("{:0>3}", m.as_str()));

        let drg = drg_code.or_else(|| self.procedure_phrase(question));

        let radius = self.radius.captures(question);
        let radius_span = radius.as_ref().and_then(|c| c.get(0)).map(|m| m.range());
        let radius_km = radius.and_then(|c| {
            let value: f64 = c.get(1)?.as_str().parse().ok()?;
            let unit = c.get(2)?.as_str().to_ascii_lowercase();
            Some(if unit.starts_with('k') {
                value
            } else {
                value * KM_PER_MILE
            })
        });

        let zip = self.origin_zip(question, radius_span).map(str::to_string);

        Constraints {
            drg,
            zip,
            radius_km,
        }
    }

    /// The ZIP the question searches around. Numbers inside the radius phrase
    /// are never taken; a ZIP after "of", "near" or similar beats a bare one,
    /// and among bare ones the last wins.
    fn origin_zip<'q>(
        &self,
        question: &'q str,
        radius_span: Option<std::ops::Range<usize>>,
    ) -> Option<&'q str> {
        let outside_radius = |m: &regex::Match<'_>| match &radius_span {
            Some(r) => m.end() <= r.start || m.start() >= r.end,
            None => true,
        };
        let anchored = self
            .anchored_zip
            .captures_iter(question)
            .filter_map(|c| c.get(1))
            .find(|m| outside_radius(m));
        anchored
            .or_else(|| {
                self.zip
                    .captures_iter(question)
                    .filter_map(|c| c.get(1))
                    .filter(|m| outside_radius(m))
                    .last()
            })
            .map(|m| m.as_str())
    }

    fn procedure_phrase(&self, question: &str) -> Option<String> {
        self.description.captures_iter(question).find_map(|c| {
            let phrase = c.get(1)?.as_str().trim();
            let meaningful = phrase
                .split_whitespace()
                .any(|w| !GENERIC_WORDS.contains(&w.to_lowercase().as_str()));
            meaningful.then(|| strip_articles(phrase))
        })
    }
}

fn distinct_hits(words: &[String], terms: &[&str]) -> usize {
    let mut hits: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|w| terms.contains(w))
        .collect();
    hits.sort_unstable();
    hits.dedup();
    hits.len()
}

fn strip_articles(phrase: &str) -> String {
    let mut words: Vec<&str> = phrase.split_whitespace().collect();
    while let Some(first) = words.first() {
        if GENERIC_WORDS.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ScopeGuard {
        ScopeGuard::new()
    }

    #[test]
    fn cheapest_drg_question_extracts_everything() {
        let c = guard().classify("Who is the cheapest provider for DRG 470 within 25 miles of 10001?");
        assert!(c.in_scope);
        assert_eq!(c.intent, Intent::Cost);
        assert_eq!(c.constraints.drg.as_deref(), Some("470"));
        assert_eq!(c.constraints.zip.as_deref(), Some("10001"));
        let km = c.constraints.radius_km.unwrap();
        assert!((km - 40.2336).abs() < 1e-9, "got {km}");
    }

    #[test]
    fn unrelated_question_is_out_of_scope() {
        let c = guard().classify("What is the capital of France?");
        assert!(!c.in_scope);
        assert_eq!(c.intent, Intent::Unknown);
    }

    #[test]
    fn quality_question_with_procedure_phrase() {
        let c = guard().classify("Which hospitals have the best ratings for heart failure near 02134?");
        assert!(c.in_scope);
        assert_eq!(c.intent, Intent::Quality);
        assert_eq!(c.constraints.drg.as_deref(), Some("heart failure"));
        assert_eq!(c.constraints.zip.as_deref(), Some("02134"));
        assert_eq!(c.constraints.radius_km, None);
    }

    #[test]
    fn short_codes_are_zero_padded() {
        let c = guard().classify("price of ms-drg 23 in 36301");
        assert_eq!(c.constraints.drg.as_deref(), Some("023"));
        assert_eq!(c.constraints.zip.as_deref(), Some("36301"));
    }

    #[test]
    fn kilometres_are_kept_as_is() {
        let c = guard().extract("hospitals within 15 km of 10001");
        assert_eq!(c.radius_km, Some(15.0));
    }

    #[test]
    fn missing_constraints_do_not_block_scope() {
        let c = guard().classify("Which hospital is cheapest for knee replacement?");
        assert!(c.in_scope);
        assert_eq!(c.constraints.drg.as_deref(), Some("knee replacement"));
        assert_eq!(c.constraints.zip, None);
    }

    #[test]
    fn generic_for_phrase_is_not_a_procedure() {
        let c = guard().extract("cheapest option for the hospital near 10001");
        assert_eq!(c.drg, None);
    }

    #[test]
    fn cost_words_need_a_location_without_medical_context() {
        assert!(!guard().classify("What is the cheapest flight to Paris?").in_scope);
        assert!(guard().classify("What is cheapest around 10001?").in_scope);
    }

    #[test]
    fn everyday_uses_of_medical_words_are_out_of_scope() {
        for q in [
            "Who played the Doctor in Doctor Who?",
            "What is the cheapest pizza delivery?",
            "How do I stay patient in traffic?",
            "Best joint to get a burger?",
            "Is heart rate a good score for fitness?",
        ] {
            assert!(!guard().classify(q).in_scope, "{q}");
        }
    }

    #[test]
    fn medical_words_count_when_they_describe_a_procedure() {
        assert!(guard().classify("How much does a knee replacement cost?").in_scope);
        assert!(guard().classify("cheapest hip replacement within 20 miles of 10001").in_scope);
        assert!(guard().classify("Which surgery is cheapest?").in_scope);
        assert!(guard().classify("Tell me about knee replacement").in_scope);
    }

    #[test]
    fn radius_number_is_not_mistaken_for_the_zip() {
        let c = guard().extract("cheapest DRG 470 within 10000 km of 10001");
        assert_eq!(c.drg.as_deref(), Some("470"));
        assert_eq!(c.zip.as_deref(), Some("10001"));
        assert_eq!(c.radius_km, Some(10000.0));
    }

    #[test]
    fn anchored_zip_beats_a_bare_number() {
        let c = guard().extract("hospitals near 10016 with 12345 reviews");
        assert_eq!(c.zip.as_deref(), Some("10016"));
        let c = guard().extract("DRG 470 prices, 36301 and 36305");
        assert_eq!(c.zip.as_deref(), Some("36305"));
    }
}
