use serde::Serialize;

use crate::error::NavigatorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub provider_id: String,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedurePrice {
    pub provider_id: String,
    pub ms_drg_code: String,
    pub ms_drg_description: String,
    pub total_discharges: Option<i64>,

    pub avg_covered_charges: Option<f64>,
    pub avg_total_payments: Option<f64>,
    pub avg_medicare_payments: Option<f64>,
}

/// Provider quality score. Always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self, NavigatorError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(NavigatorError::invalid(
                "rating",
                format!("must be between {} and {}, got {value}", Self::MIN, Self::MAX),
            ))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// One ranked row: provider joined with a single DRG price and its rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderPriceRating {
    pub provider_id: String,
    pub provider_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: String,

    pub ms_drg_code: String,
    pub ms_drg_description: String,
    pub total_discharges: Option<i64>,
    pub avg_covered_charges: Option<f64>,
    pub avg_total_payments: Option<f64>,
    pub avg_medicare_payments: Option<f64>,

    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Rounds a currency amount to cents.
pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
