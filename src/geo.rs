use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, anyhow};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_PER_MILE: f64 = 1.609344;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone)]
pub struct ZipCentroid {
    pub zip5: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZipDistance {
    pub zip5: String,
    pub distance_km: f64,
}

/// Great-circle distance between two points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Resolves ZIP codes to locations and answers proximity questions.
///
/// ZIP centroids are the only strategy today; a geocoder with street-level
/// precision would slot in behind the same trait.
pub trait LocationResolver: Send + Sync {
    fn strategy(&self) -> &'static str;

    fn locate(&self, zip5: &str) -> Option<GeoPoint>;

    /// All known ZIPs within `radius_km` of `origin`, ordered by ZIP.
    fn zips_within(&self, origin: GeoPoint, radius_km: f64) -> Vec<ZipDistance>;
}

#[derive(Debug, Clone, Default)]
pub struct ZipCentroidIndex {
    centroids: BTreeMap<String, GeoPoint>,
}

impl ZipCentroidIndex {
    pub fn from_centroids(items: impl IntoIterator<Item = ZipCentroid>) -> Self {
        let centroids = items
            .into_iter()
            .map(|c| (c.zip5, GeoPoint { lat: c.lat, lon: c.lon }))
            .collect();
        Self { centroids }
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }
}

impl LocationResolver for ZipCentroidIndex {
    fn strategy(&self) -> &'static str {
        "zip-centroid"
    }

    fn locate(&self, zip5: &str) -> Option<GeoPoint> {
        self.centroids.get(zip5).copied()
    }

    fn zips_within(&self, origin: GeoPoint, radius_km: f64) -> Vec<ZipDistance> {
        self.centroids
            .iter()
            .filter_map(|(zip5, p)| {
                let distance_km = haversine_km(origin, *p);
                (distance_km <= radius_km).then(|| ZipDistance {
                    zip5: zip5.clone(),
                    distance_km,
                })
            })
            .collect()
    }
}

/// Pulls the first run of five digits out of a raw ZIP / ZIP+4 value.
pub fn normalize_zip5(s: &str) -> Option<String> {
    let mut digits = String::with_capacity(5);
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 5 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.len() == 5 {
        Some(digits)
    } else {
        None
    }
}

pub fn parse_geonames_us_txt(path: &Path) -> anyhow::Result<Vec<ZipCentroid>> {
    let data = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_geonames_lines(&data)
}

fn parse_geonames_lines(data: &str) -> anyhow::Result<Vec<ZipCentroid>> {
    let mut out = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 11 {
            return Err(anyhow!(
                "GeoNames line {} has too few columns ({}): {}",
                lineno + 1,
                parts.len(),
                line
            ));
        }
        let Some(zip5) = normalize_zip5(parts[1]) else {
            continue;
        };
        let lat: f64 = parts[9]
            .trim()
            .parse()
            .with_context(|| format!("parse lat on line {}", lineno + 1))?;
        let lon: f64 = parts[10]
            .trim()
            .parse()
            .with_context(|| format!("parse lon on line {}", lineno + 1))?;
        out.push(ZipCentroid { zip5, lat, lon });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NYC: GeoPoint = GeoPoint {
        lat: 40.7506,
        lon: -73.9972,
    };

    #[test]
    fn haversine_zero_and_symmetric() {
        let la = GeoPoint {
            lat: 34.0522,
            lon: -118.2437,
        };
        assert_eq!(haversine_km(NYC, NYC), 0.0);
        assert!((haversine_km(NYC, la) - haversine_km(la, NYC)).abs() < 1e-9);
    }

    #[test]
    fn haversine_known_distance() {
        // New York to Los Angeles is roughly 3936 km on a 6371 km sphere.
        let la = GeoPoint {
            lat: 34.0522,
            lon: -118.2437,
        };
        let d = haversine_km(NYC, la);
        assert!((3900.0..3980.0).contains(&d), "got {d}");
    }

    #[test]
    fn zips_within_includes_origin_and_respects_radius() {
        let index = ZipCentroidIndex::from_centroids([
            ZipCentroid {
                zip5: "10001".into(),
                lat: NYC.lat,
                lon: NYC.lon,
            },
            ZipCentroid {
                zip5: "07030".into(),
                lat: 40.7450,
                lon: -74.0322,
            },
            ZipCentroid {
                zip5: "90012".into(),
                lat: 34.0614,
                lon: -118.2385,
            },
        ]);
        let near = index.zips_within(NYC, 10.0);
        let zips: Vec<&str> = near.iter().map(|z| z.zip5.as_str()).collect();
        assert_eq!(zips, vec!["07030", "10001"]);
        assert!(near.iter().all(|z| z.distance_km <= 10.0));
        assert!(index.locate("90012").is_some());
        assert!(index.locate("99999").is_none());
    }

    #[test]
    fn normalize_zip5_handles_plus_four_and_garbage() {
        assert_eq!(normalize_zip5("10001-1234").as_deref(), Some("10001"));
        assert_eq!(normalize_zip5(" 02134 ").as_deref(), Some("02134"));
        assert_eq!(normalize_zip5("123"), None);
        assert_eq!(normalize_zip5("12 345"), None);
    }

    #[test]
    fn parses_geonames_rows() {
        let data = "US\t10001\tNew York\tNew York\tNY\tNew York\t061\t\t\t40.7484\t-73.9967\t4\n\
                    US\tABCDE\tNowhere\t\t\t\t\t\t\t0\t0\t1\n";
        let rows = parse_geonames_lines(data).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].zip5, "10001");
        assert!((rows[0].lat - 40.7484).abs() < 1e-9);
    }

    #[test]
    fn short_geonames_row_is_an_error() {
        assert!(parse_geonames_lines("US\t10001\tNew York\n").is_err());
    }
}
