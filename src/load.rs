//! `load`: ZIP centroids plus a CMS inpatient charges CSV into DuckDB.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, anyhow};
use csv::StringRecord;
use regex::Regex;

use crate::cli::LoadArgs;
use crate::download;
use crate::geo;
use crate::model::{ProcedurePrice, Provider, Rating, round_cents};
use crate::storage::StoragePaths;
use crate::store::{self, Store};

const PROVIDER_ID_COLUMNS: &[&str] = &["Rndrng_Prvdr_CCN", "provider_id", "Provider.Id", "Provider Id"];
const NAME_COLUMNS: &[&str] = &["Rndrng_Prvdr_Org_Name", "provider_name", "Provider.Name", "Provider Name", "name"];
const CITY_COLUMNS: &[&str] = &["Rndrng_Prvdr_City", "provider_city", "Provider City", "city"];
const STATE_COLUMNS: &[&str] = &["Rndrng_Prvdr_State_Abrvtn", "provider_state", "Provider State", "state"];
const ZIP_COLUMNS: &[&str] = &["Rndrng_Prvdr_Zip5", "provider_zip_code", "Provider Zip Code", "zip"];
const DRG_CODE_COLUMNS: &[&str] = &["DRG_Cd", "ms_drg_code", "DRG.Code", "DRG_Code", "drg"];
const DRG_DESC_COLUMNS: &[&str] = &[
    "DRG_Desc",
    "ms_drg_description",
    "ms_drg_definition",
    "DRG.Definition",
    "DRG Definition",
];
const DISCHARGE_COLUMNS: &[&str] = &["Tot_Dschrgs", "total_discharges", "Total Discharges"];
const COVERED_COLUMNS: &[&str] = &[
    "Avg_Cvrg_Chrg",
    "average_covered_charges",
    "Average.Covered.Charges",
    "Average Covered Charges",
    "Avg Covered Charges",
];
const TOTAL_PAYMENT_COLUMNS: &[&str] = &[
    "Avg_Tot_Pymt_Amt",
    "average_total_payments",
    "Average.Total.Payments",
    "Average Total Payments",
    "Avg Total Payments",
];
const MEDICARE_PAYMENT_COLUMNS: &[&str] = &[
    "Avg_Mdcr_Pymt_Amt",
    "average_medicare_payments",
    "Average.Medicare.Payments",
    "Average Medicare Payments",
    "Avg Medicare Payments",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LoadSummary {
    pub rows: u64,
    pub providers: u64,
    pub skipped: u64,
}

pub async fn run(opts: LoadArgs) -> anyhow::Result<()> {
    tracing::info!("cost-navigator load");
    tracing::info!("data_dir={} csv={}", opts.data_dir, opts.csv.display());
    if opts.offline {
        tracing::info!("offline=true (will not download missing ZIP centroids)");
    }

    let paths = StoragePaths::new(&opts.data_dir);
    paths.ensure_dirs().context("create data directories")?;

    tracing::info!("Step 1/3: ensure ZIP centroids");
    let geonames_txt = download::ensure_zip_centroids(&paths, &opts).await?;

    tracing::info!("Step 2/3: open DuckDB + load zip_centroids");
    let t0 = std::time::Instant::now();
    let store = Store::open(&paths.duckdb_path)?;
    store.ensure_schema().context("create schema")?;
    let n = load_zip_centroids(&store, &geonames_txt).context("load zip_centroids")?;
    tracing::info!(
        "Loaded {} ZIP centroids in {:.1}s from {}",
        n,
        t0.elapsed().as_secs_f64(),
        geonames_txt.display()
    );

    tracing::info!("Step 3/3: load providers, prices and ratings");
    let t1 = std::time::Instant::now();
    let summary = load_charges_csv(&store, &opts.csv)
        .with_context(|| format!("load {}", opts.csv.display()))?;
    tracing::info!(
        "Loaded {} rows for {} providers ({} skipped) in {:.1}s",
        summary.rows,
        summary.providers,
        summary.skipped,
        t1.elapsed().as_secs_f64()
    );

    let counts = store.counts()?;
    tracing::info!(
        providers = counts.providers,
        prices = counts.prices,
        ratings = counts.ratings,
        zip_centroids = counts.zip_centroids,
        "store ready at {}",
        paths.duckdb_path.display()
    );
    Ok(())
}

/// Replaces the `zip_centroids` table with the contents of a GeoNames file.
pub fn load_zip_centroids(store: &Store, geonames_txt: &Path) -> anyhow::Result<usize> {
    let centroids = geo::parse_geonames_us_txt(geonames_txt)?;
    let mut conn = store.acquire()?;
    let tx = conn.transaction()?;
    store::replace_zip_centroids(&tx, &centroids)?;
    tx.commit()?;
    Ok(centroids.len())
}

pub fn load_charges_csv(store: &Store, path: &Path) -> anyhow::Result<LoadSummary> {
    let f = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    load_charges(store, f)
}

/// Upserts every CSV row in one transaction; any bad row rolls the load back.
pub fn load_charges<R: Read>(store: &Store, reader: R) -> anyhow::Result<LoadSummary> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = ColumnMap::from_headers(rdr.headers()?)?;
    let leading_code = Regex::new(r"^\s*(\d{3})\b")?;

    let mut conn = store.acquire()?;
    let tx = conn.transaction()?;
    let mut summary = LoadSummary::default();
    let mut rated: HashSet<String> = HashSet::new();

    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("read CSV record {}", i + 1))?;
        let Some((provider, price)) = columns.parse(&record, &leading_code) else {
            summary.skipped += 1;
            continue;
        };
        store::upsert_provider(&tx, &provider)?;
        store::upsert_price(&tx, &price)?;
        if rated.insert(provider.provider_id.clone()) {
            store::upsert_rating(&tx, &provider.provider_id, mock_rating(&provider.provider_id)?)?;
        }
        summary.rows += 1;
    }

    tx.commit()?;
    summary.providers = rated.len() as u64;
    if summary.skipped > 0 {
        tracing::warn!(skipped = summary.skipped, "rows without a provider id were skipped");
    }
    Ok(summary)
}

#[derive(Debug, Clone)]
struct ColumnMap {
    provider_id: usize,
    name: usize,
    city: Option<usize>,
    state: Option<usize>,
    zip: usize,
    drg_code: Option<usize>,
    drg_desc: usize,
    discharges: Option<usize>,
    covered: Option<usize>,
    total_payments: Option<usize>,
    medicare_payments: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> anyhow::Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let pick = |options: &[&str]| {
            options
                .iter()
                .find_map(|o| names.iter().position(|n| *n == o.to_lowercase()))
        };

        let (Some(provider_id), Some(name), Some(zip), Some(drg_desc)) = (
            pick(PROVIDER_ID_COLUMNS),
            pick(NAME_COLUMNS),
            pick(ZIP_COLUMNS),
            pick(DRG_DESC_COLUMNS),
        ) else {
            return Err(anyhow!(
                "CSV missing required columns: provider id, provider name, zip, or DRG description (headers: {})",
                headers.iter().collect::<Vec<_>>().join(", ")
            ));
        };

        Ok(Self {
            provider_id,
            name,
            city: pick(CITY_COLUMNS),
            state: pick(STATE_COLUMNS),
            zip,
            drg_code: pick(DRG_CODE_COLUMNS),
            drg_desc,
            discharges: pick(DISCHARGE_COLUMNS),
            covered: pick(COVERED_COLUMNS),
            total_payments: pick(TOTAL_PAYMENT_COLUMNS),
            medicare_payments: pick(MEDICARE_PAYMENT_COLUMNS),
        })
    }

    fn parse(&self, record: &StringRecord, leading_code: &Regex) -> Option<(Provider, ProcedurePrice)> {
        let field = move |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
        let optional = move |idx: Option<usize>| {
            idx.map(field)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let provider_id = field(self.provider_id);
        if provider_id.is_empty() {
            return None;
        }

        let description = field(self.drg_desc).to_string();
        let code = match self.drg_code.map(field).filter(|s| !s.is_empty()) {
            Some(raw) => raw.split_whitespace().next().unwrap_or(raw).to_string(),
            None => leading_code
                .captures(&description)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "000".to_string()),
        };

        let provider = Provider {
            provider_id: provider_id.to_string(),
            name: field(self.name).to_string(),
            city: optional(self.city),
            state: optional(self.state),
            zip: pad_zip5(field(self.zip)),
        };
        let price = ProcedurePrice {
            provider_id: provider_id.to_string(),
            ms_drg_code: format!("{code:0>3}"),
            ms_drg_description: description,
            total_discharges: self.discharges.map(field).and_then(parse_count),
            avg_covered_charges: self.covered.map(field).and_then(parse_money),
            avg_total_payments: self.total_payments.map(field).and_then(parse_money),
            avg_medicare_payments: self.medicare_payments.map(field).and_then(parse_money),
        };
        Some((provider, price))
    }
}

/// Digits only, left padded with zeros and cut to five.
fn pad_zip5(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let padded = format!("{digits:0>5}");
    padded[..5].to_string()
}

fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    let v: f64 = cleaned.trim().parse().ok()?;
    v.is_finite().then(|| round_cents(v))
}

fn parse_count(raw: &str) -> Option<i64> {
    raw.replace(',', "").trim().parse().ok()
}

/// Placeholder 1..=10 rating, stable for a given provider id (FNV-1a).
fn mock_rating(provider_id: &str) -> anyhow::Result<Rating> {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in provider_id.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    Ok(Rating::new((hash % 10) as i64 + 1)?)
}
