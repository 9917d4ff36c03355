#![allow(dead_code)]

use std::sync::Arc;

use cost_navigator::RankingEngine;
use cost_navigator::geo::{ZipCentroid, ZipCentroidIndex};
use cost_navigator::model::{ProcedurePrice, Provider, Rating};
use cost_navigator::store::{self, Store};

pub const CRANIOTOMY: &str = "CRANIOTOMY WITH MAJOR DEVICE IMPLANT OR ACUTE COMPLEX CNS PRINCIPAL \
     DIAGNOSIS WITH MCC OR CHEMOTHERAPY IMPLANT OR EPILEPSY WITH NEUROSTIMULATOR";
pub const JOINT: &str =
    "MAJOR HIP AND KNEE JOINT REPLACEMENT OR REATTACHMENT OF LOWER EXTREMITY WITHOUT MCC";

pub const CENTROIDS: &[(&str, f64, f64)] = &[
    // Dothan, AL area
    ("36301", 31.1577, -85.3816),
    ("36303", 31.2626, -85.3958),
    ("36305", 31.2053, -85.4974),
    ("36330", 31.3152, -85.8552),
    // New York area
    ("10001", 40.7506, -73.9972),
    ("10016", 40.7454, -73.9781),
    ("10029", 40.7918, -73.9441),
    ("07030", 40.7450, -74.0322),
    ("08540", 40.3600, -74.6600),
];

struct Row {
    id: &'static str,
    name: &'static str,
    city: &'static str,
    state: &'static str,
    zip: &'static str,
    code: &'static str,
    covered: Option<f64>,
    rating: Option<i64>,
}

const ROWS: &[Row] = &[
    Row { id: "010001", name: "SOUTHEAST HEALTH MEDICAL CENTER", city: "DOTHAN", state: "AL", zip: "36301", code: "023", covered: Some(158541.64), rating: Some(6) },
    Row { id: "010001", name: "SOUTHEAST HEALTH MEDICAL CENTER", city: "DOTHAN", state: "AL", zip: "36301", code: "470", covered: Some(60000.0), rating: Some(6) },
    Row { id: "010055", name: "FLOWERS HOSPITAL", city: "DOTHAN", state: "AL", zip: "36305", code: "023", covered: Some(140000.0), rating: Some(8) },
    Row { id: "010090", name: "DOTHAN SURGICAL HOSPITAL", city: "DOTHAN", state: "AL", zip: "36303", code: "023", covered: None, rating: None },
    Row { id: "010049", name: "MEDICAL CENTER ENTERPRISE", city: "ENTERPRISE", state: "AL", zip: "36330", code: "023", covered: Some(90000.0), rating: Some(3) },
    Row { id: "330214", name: "NYU LANGONE HOSPITALS", city: "NEW YORK", state: "NY", zip: "10016", code: "470", covered: Some(120000.0), rating: Some(9) },
    Row { id: "330024", name: "MOUNT SINAI HOSPITAL", city: "NEW YORK", state: "NY", zip: "10029", code: "470", covered: Some(95000.0), rating: Some(7) },
    Row { id: "330101", name: "CHELSEA GENERAL HOSPITAL", city: "NEW YORK", state: "NY", zip: "10001", code: "470", covered: Some(95000.0), rating: Some(9) },
    Row { id: "310040", name: "HOBOKEN UNIVERSITY MEDICAL CENTER", city: "HOBOKEN", state: "NJ", zip: "07030", code: "470", covered: Some(150000.0), rating: None },
    Row { id: "310010", name: "PENN MEDICINE PRINCETON MEDICAL CENTER", city: "PLAINSBORO", state: "NJ", zip: "08540", code: "470", covered: Some(50000.0), rating: Some(10) },
];

pub fn centroids() -> Vec<ZipCentroid> {
    CENTROIDS
        .iter()
        .map(|(zip5, lat, lon)| ZipCentroid {
            zip5: zip5.to_string(),
            lat: *lat,
            lon: *lon,
        })
        .collect()
}

/// In-memory store seeded with a handful of Alabama and New York providers.
pub fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.ensure_schema().unwrap();
    let conn = store.acquire().unwrap();
    store::replace_zip_centroids(&conn, &centroids()).unwrap();
    for r in ROWS {
        store::upsert_provider(
            &conn,
            &Provider {
                provider_id: r.id.into(),
                name: r.name.into(),
                city: Some(r.city.into()),
                state: Some(r.state.into()),
                zip: r.zip.into(),
            },
        )
        .unwrap();
        store::upsert_price(
            &conn,
            &ProcedurePrice {
                provider_id: r.id.into(),
                ms_drg_code: r.code.into(),
                ms_drg_description: if r.code == "023" { CRANIOTOMY } else { JOINT }.into(),
                total_discharges: Some(11),
                avg_covered_charges: r.covered,
                avg_total_payments: r.covered.map(|c| c / 4.0),
                avg_medicare_payments: r.covered.map(|c| c / 5.0),
            },
        )
        .unwrap();
        if let Some(rating) = r.rating {
            store::upsert_rating(&conn, r.id, Rating::new(rating).unwrap()).unwrap();
        }
    }
    store
}

pub fn engine(store: &Store) -> RankingEngine {
    let index = store.load_zip_index().unwrap();
    RankingEngine::new(store.clone(), Arc::new(index))
}

pub fn index() -> ZipCentroidIndex {
    ZipCentroidIndex::from_centroids(centroids())
}
