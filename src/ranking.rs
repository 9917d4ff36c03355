use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use duckdb::{Connection, params_from_iter};
use serde::Deserialize;

use crate::error::{NavigatorError, NavigatorResult};
use crate::geo::{LocationResolver, ZipDistance};
use crate::model::{ProviderPriceRating, Rating};
use crate::query::{
    DrgFilter, DrgMatch, GeoScope, RadiusKm, SafeQuery, Template, ZipMatch, Zip5, validate_limit,
};
use crate::store::Store;

/// Minimum share of the filter's trigrams a description must contain for the
/// fuzzy fallback to pick its DRG code.
const TRIGRAM_THRESHOLD: f64 = 0.5;

/// Raw `/providers` parameters, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSearch {
    pub drg: Option<String>,
    pub zip: Option<String>,
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
}

impl ProviderSearch {
    pub fn to_query(&self, template: Template) -> NavigatorResult<SafeQuery> {
        let drg = self.drg.as_deref().map(DrgFilter::parse).transpose()?;
        let zip = self.zip.as_deref().map(Zip5::parse).transpose()?;
        let radius_km = self.radius_km.map(RadiusKm::new).transpose()?;
        let limit = validate_limit(self.limit)?;
        if zip.is_none() && radius_km.is_some() {
            tracing::debug!("radius given without a zip; ignoring radius");
        }
        Ok(SafeQuery::new(template, drg, zip, radius_km, limit))
    }
}

/// Ranks provider/price/rating rows for a procedure and location.
///
/// Holds no per-request state; clones share the store and the location
/// resolver.
#[derive(Clone)]
pub struct RankingEngine {
    store: Store,
    locations: Arc<dyn LocationResolver>,
}

impl RankingEngine {
    pub fn new(store: Store, locations: Arc<dyn LocationResolver>) -> Self {
        Self { store, locations }
    }

    /// Cheapest-first search.
    pub fn search(&self, req: &ProviderSearch) -> NavigatorResult<Vec<ProviderPriceRating>> {
        let query = req.to_query(Template::CostRanking)?;
        self.execute(&query)
    }

    pub fn execute(&self, query: &SafeQuery) -> NavigatorResult<Vec<ProviderPriceRating>> {
        let near = self.resolve_radius(&query.geo)?;
        let zips = match (&query.geo, near.as_deref()) {
            (GeoScope::ExactZip(zip), _) => ZipMatch::Exact(zip),
            (_, Some(near)) => ZipMatch::AnyOf(near),
            _ => ZipMatch::Any,
        };

        let conn = self.store.acquire()?;
        let mut rows = fetch(&conn, query, query.drg.as_ref().map(DrgMatch::Direct), zips)?;

        if rows.is_empty() {
            if let Some(filter) = query.drg.as_ref().filter(|f| !f.looks_like_code()) {
                let codes = similar_drg_codes(&conn, filter)?;
                if !codes.is_empty() {
                    tracing::debug!(
                        filter = %filter,
                        codes = ?codes,
                        "no substring match; retrying with trigram-similar DRG codes"
                    );
                    rows = fetch(&conn, query, Some(DrgMatch::Codes(&codes)), zips)?;
                }
            }
        }

        if let Some(near) = &near {
            let by_zip: HashMap<&str, f64> = near
                .iter()
                .map(|z| (z.zip5.as_str(), z.distance_km))
                .collect();
            for row in &mut rows {
                row.distance_km = by_zip.get(row.zip.as_str()).copied();
            }
        }

        tracing::debug!(
            template = query.template.id(),
            rows = rows.len(),
            "ranking query executed"
        );
        Ok(rows)
    }

    fn resolve_radius(&self, geo: &GeoScope) -> NavigatorResult<Option<Vec<ZipDistance>>> {
        let GeoScope::Radius { zip, radius_km } = geo else {
            return Ok(None);
        };
        let origin = self
            .locations
            .locate(zip.as_str())
            .ok_or_else(|| NavigatorError::GeoLookup {
                zip: zip.to_string(),
            })?;
        let near = self.locations.zips_within(origin, radius_km.get());
        tracing::debug!(
            strategy = self.locations.strategy(),
            zip = %zip,
            radius_km = radius_km.get(),
            zips = near.len(),
            "resolved search radius"
        );
        Ok(Some(near))
    }
}

fn fetch(
    conn: &Connection,
    query: &SafeQuery,
    drg: Option<DrgMatch<'_>>,
    zips: ZipMatch<'_>,
) -> NavigatorResult<Vec<ProviderPriceRating>> {
    let rendered = query.render(drg, zips);
    let mut stmt = conn.prepare(&rendered.sql)?;
    let rows = stmt.query_map(params_from_iter(rendered.params.iter()), |row| {
        Ok(ProviderPriceRating {
            provider_id: row.get(0)?,
            provider_name: row.get(1)?,
            city: row.get(2)?,
            state: row.get(3)?,
            zip: row.get(4)?,
            ms_drg_code: row.get(5)?,
            ms_drg_description: row.get(6)?,
            total_discharges: row.get(7)?,
            avg_covered_charges: row.get(8)?,
            avg_total_payments: row.get(9)?,
            avg_medicare_payments: row.get(10)?,
            rating: row
                .get::<usize, Option<i64>>(11)?
                .and_then(|v| Rating::new(v).ok()),
            distance_km: None,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn similar_drg_codes(conn: &Connection, filter: &DrgFilter) -> NavigatorResult<Vec<String>> {
    let wanted = trigrams(filter.as_str());
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT DISTINCT ms_drg_code, ms_drg_description FROM drg_prices ORDER BY ms_drg_code",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<usize, String>(0)?, row.get::<usize, String>(1)?))
    })?;
    let mut codes = BTreeSet::new();
    for r in rows {
        let (code, desc) = r?;
        if trigram_coverage(&wanted, &trigrams(&desc)) >= TRIGRAM_THRESHOLD {
            codes.insert(code);
        }
    }
    Ok(codes.into_iter().collect())
}

/// Word trigrams in the pg_trgm style: lowercased alphanumeric words padded
/// with two leading blanks and one trailing blank.
fn trigrams(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
        for w in padded.windows(3) {
            out.insert(w.iter().collect());
        }
    }
    out
}

fn trigram_coverage(wanted: &BTreeSet<String>, have: &BTreeSet<String>) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    wanted.intersection(have).count() as f64 / wanted.len() as f64
}
