//! Allow-listed query templates and validated parameters.
//!
//! Nothing in here accepts SQL text from the outside. A [`SafeQuery`] is a
//! template identifier plus typed parameters, and rendering only ever stitches
//! together the fixed fragments below with `?` placeholders.

use std::fmt;

use duckdb::types::Value;

use crate::error::{NavigatorError, NavigatorResult};
use crate::geo::ZipDistance;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;
const MAX_DRG_FILTER_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zip5(String);

impl Zip5 {
    pub fn parse(raw: &str) -> NavigatorResult<Self> {
        let s = raw.trim();
        if s.len() == 5 && s.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(NavigatorError::invalid(
                "zip",
                format!("expected a 5-digit ZIP code, got {raw:?}"),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zip5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RadiusKm(f64);

impl RadiusKm {
    pub fn new(km: f64) -> NavigatorResult<Self> {
        if km.is_finite() && km > 0.0 {
            Ok(Self(km))
        } else {
            Err(NavigatorError::invalid(
                "radius_km",
                format!("must be a positive number, got {km}"),
            ))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// A DRG code or a fragment of its description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrgFilter(String);

impl DrgFilter {
    pub fn parse(raw: &str) -> NavigatorResult<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(NavigatorError::invalid("drg", "must not be empty"));
        }
        if s.chars().count() > MAX_DRG_FILTER_LEN {
            return Err(NavigatorError::invalid(
                "drg",
                format!("longer than {MAX_DRG_FILTER_LEN} characters"),
            ));
        }
        if s.chars().any(char::is_control) {
            return Err(NavigatorError::invalid("drg", "contains control characters"));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Purely numeric filters are codes; they never go through fuzzy matching.
    pub fn looks_like_code(&self) -> bool {
        self.0.chars().all(|c| c.is_ascii_digit())
    }
}

impl fmt::Display for DrgFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_limit(limit: Option<usize>) -> NavigatorResult<usize> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(n) if (1..=MAX_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(NavigatorError::invalid(
            "limit",
            format!("must be between 1 and {MAX_LIMIT}, got {n}"),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Cheapest first: `avg_covered_charges` ascending.
    CostRanking,
    /// Best rated first: `rating` descending.
    QualityRanking,
}

impl Template {
    pub const ALL: [Template; 2] = [Template::CostRanking, Template::QualityRanking];

    pub fn id(self) -> &'static str {
        match self {
            Template::CostRanking => "cost_ranking",
            Template::QualityRanking => "quality_ranking",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    fn order_by(self) -> &'static str {
        match self {
            Template::CostRanking => {
                "dp.avg_covered_charges ASC NULLS LAST, p.provider_id ASC, dp.ms_drg_code ASC"
            }
            Template::QualityRanking => {
                "r.rating DESC NULLS LAST, p.provider_id ASC, dp.ms_drg_code ASC"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoScope {
    Anywhere,
    /// ZIP without a radius: providers in exactly that ZIP.
    ExactZip(Zip5),
    Radius { zip: Zip5, radius_km: RadiusKm },
}

impl GeoScope {
    pub fn new(zip: Option<Zip5>, radius_km: Option<RadiusKm>) -> Self {
        match (zip, radius_km) {
            (Some(zip), Some(radius_km)) => GeoScope::Radius { zip, radius_km },
            (Some(zip), None) => GeoScope::ExactZip(zip),
            (None, _) => GeoScope::Anywhere,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafeQuery {
    pub template: Template,
    pub drg: Option<DrgFilter>,
    pub geo: GeoScope,
    pub limit: usize,
}

/// How the DRG filter is applied for one execution.
#[derive(Debug, Clone, Copy)]
pub enum DrgMatch<'a> {
    /// Exact code or case-insensitive description substring.
    Direct(&'a DrgFilter),
    /// Codes picked by the fuzzy fallback.
    Codes(&'a [String]),
}

/// Geographic restriction after the ZIP has been resolved.
#[derive(Debug, Clone, Copy)]
pub enum ZipMatch<'a> {
    Any,
    Exact(&'a Zip5),
    AnyOf(&'a [ZipDistance]),
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

const SELECT_SQL: &str = r#"
    SELECT
      p.provider_id,
      p.name,
      p.city,
      p.state,
      p.zip,
      dp.ms_drg_code,
      dp.ms_drg_description,
      CAST(dp.total_discharges AS BIGINT),
      CAST(dp.avg_covered_charges AS DOUBLE),
      CAST(dp.avg_total_payments AS DOUBLE),
      CAST(dp.avg_medicare_payments AS DOUBLE),
      CAST(r.rating AS BIGINT)
    FROM drg_prices dp
    JOIN providers p ON p.provider_id = dp.provider_id
    LEFT JOIN ratings r ON r.provider_id = p.provider_id
"#;

impl SafeQuery {
    pub fn new(
        template: Template,
        drg: Option<DrgFilter>,
        zip: Option<Zip5>,
        radius_km: Option<RadiusKm>,
        limit: usize,
    ) -> Self {
        Self {
            template,
            drg,
            geo: GeoScope::new(zip, radius_km),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn render(&self, drg: Option<DrgMatch<'_>>, zips: ZipMatch<'_>) -> Statement {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        match drg {
            None => {}
            Some(DrgMatch::Direct(f)) => {
                clauses.push(
                    "(dp.ms_drg_code = ? OR contains(lower(dp.ms_drg_description), lower(?)))"
                        .to_string(),
                );
                params.push(Value::Text(f.as_str().to_string()));
                params.push(Value::Text(f.as_str().to_string()));
            }
            Some(DrgMatch::Codes(codes)) => {
                clauses.push(format!("dp.ms_drg_code IN ({})", placeholders(codes.len())));
                params.extend(codes.iter().map(|c| Value::Text(c.clone())));
            }
        }

        match zips {
            ZipMatch::Any => {}
            ZipMatch::Exact(zip) => {
                clauses.push("p.zip = ?".to_string());
                params.push(Value::Text(zip.as_str().to_string()));
            }
            ZipMatch::AnyOf(near) => {
                clauses.push(format!("p.zip IN ({})", placeholders(near.len())));
                params.extend(near.iter().map(|z| Value::Text(z.zip5.clone())));
            }
        }

        let where_sql = if clauses.is_empty() {
            "TRUE".to_string()
        } else {
            clauses.join(" AND ")
        };

        let sql = format!(
            "{SELECT_SQL}    WHERE {where_sql}\n    ORDER BY {}\n    LIMIT {}\n",
            self.template.order_by(),
            self.limit
        );
        Statement { sql, params }
    }
}

fn placeholders(n: usize) -> String {
    if n == 0 {
        // `IN (NULL)` matches nothing
        return "NULL".to_string();
    }
    vec!["?"; n].join(", ")
}
