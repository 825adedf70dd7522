//! EXIF-derived heuristic tags
//!
//! Camera vendor, season, time of day and place, read from the photo's EXIF
//! block. None of this touches an inference backend.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use exif::{In, Tag, Value};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// EXIF Reading
// ============================================================================

/// Fields the heuristics care about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoMetadata {
    pub make: Option<String>,
    pub model: Option<String>,
    /// Capture time as recorded by the camera (local, no zone)
    pub captured_at: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PhotoMetadata {
    /// Read EXIF from encoded image bytes; `None` when there is no EXIF block
    pub fn from_image_bytes(bytes: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(bytes);
        let exif = match exif::Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => exif,
            Err(e) => {
                debug!(error = %e, "No readable EXIF");
                return None;
            }
        };

        let ascii = |tag: Tag| -> Option<String> {
            let field = exif.get_field(tag, In::PRIMARY)?;
            match &field.value {
                Value::Ascii(parts) => parts
                    .first()
                    .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
                    .filter(|s| !s.is_empty()),
                _ => None,
            }
        };

        let captured_at = ascii(Tag::DateTimeOriginal)
            .or_else(|| ascii(Tag::DateTime))
            .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y:%m:%d %H:%M:%S").ok());

        let coordinate = |value_tag: Tag, ref_tag: Tag, negative_ref: char| -> Option<f64> {
            let field = exif.get_field(value_tag, In::PRIMARY)?;
            let degrees = match &field.value {
                Value::Rational(dms) if dms.len() >= 3 => {
                    dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0
                }
                _ => return None,
            };
            let negative = ascii(ref_tag)
                .and_then(|r| r.chars().next())
                .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));
            degrees
                .is_finite()
                .then_some(if negative { -degrees } else { degrees })
        };

        Some(Self {
            make: ascii(Tag::Make),
            model: ascii(Tag::Model),
            captured_at,
            latitude: coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S'),
            longitude: coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W'),
        })
    }

    /// Both coordinates present and in range
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.abs() <= 90.0 && lon.abs() <= 180.0 => Some((lat, lon)),
            _ => None,
        }
    }
}

// ============================================================================
// Heuristic Rules
// ============================================================================

/// (substring of lowercased make or model, canonical vendor tag)
const VENDOR_TABLE: &[(&str, &str)] = &[
    ("iphone", "iphone"),
    ("ipad", "ipad"),
    ("apple", "iphone"),
    ("pixel", "pixel"),
    ("google", "pixel"),
    ("galaxy", "galaxy"),
    ("samsung", "galaxy"),
    ("canon", "canon"),
    ("nikon", "nikon"),
    ("sony", "sony"),
    ("fujifilm", "fujifilm"),
    ("olympus", "olympus"),
    ("om digital", "om system"),
    ("panasonic", "lumix"),
    ("ricoh", "ricoh"),
    ("pentax", "pentax"),
    ("leica", "leica"),
    ("hasselblad", "hasselblad"),
    ("sigma", "sigma"),
    ("gopro", "gopro"),
    ("dji", "dji"),
    ("huawei", "huawei"),
    ("xiaomi", "xiaomi"),
];

/// Canonical vendor tag for a camera, model checked before make
pub fn vendor_tag(make: Option<&str>, model: Option<&str>) -> Option<&'static str> {
    [model, make]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .find_map(|name| {
            VENDOR_TABLE
                .iter()
                .find(|(needle, _)| name.contains(needle))
                .map(|(_, tag)| *tag)
        })
}

/// Season for a month (1-12), northern hemisphere
pub fn season_tag(month: u32) -> Option<&'static str> {
    match month {
        3..=5 => Some("spring"),
        6..=8 => Some("summer"),
        9..=11 => Some("autumn"),
        12 | 1 | 2 => Some("winter"),
        _ => None,
    }
}

/// Time of day for an hour (0-23); midday has no tag
pub fn time_of_day_tag(hour: u32) -> Option<&'static str> {
    match hour {
        4..=6 => Some("dawn"),
        7..=10 => Some("morning"),
        11..=15 => None,
        16..=18 => Some("evening"),
        19..=23 | 0..=3 => Some("night"),
        _ => None,
    }
}

// ============================================================================
// Reverse Geocoding
// ============================================================================

/// Coordinates → locality or region name
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn locality(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// A named place with a catchment radius
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

impl Place {
    pub fn new(name: &str, latitude: f64, longitude: f64, radius_km: f64) -> Self {
        Self {
            name: name.to_string(),
            latitude,
            longitude,
            radius_km,
        }
    }
}

/// Offline gazetteer: nearest place whose radius covers the point
#[derive(Debug, Clone)]
pub struct StaticGazetteer {
    places: Vec<Place>,
}

impl Default for StaticGazetteer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StaticGazetteer {
    pub fn new(places: Vec<Place>) -> Self {
        Self { places }
    }

    /// Major cities and sightseeing areas
    pub fn builtin() -> Self {
        let places = [
            ("東京", 35.6812, 139.7671, 30.0),
            ("横浜", 35.4437, 139.6380, 15.0),
            ("鎌倉", 35.3192, 139.5467, 6.0),
            ("箱根", 35.2324, 139.1069, 10.0),
            ("日光", 36.7199, 139.6982, 12.0),
            ("大阪", 34.6937, 135.5023, 20.0),
            ("京都", 35.0116, 135.7681, 15.0),
            ("奈良", 34.6851, 135.8048, 10.0),
            ("神戸", 34.6901, 135.1955, 12.0),
            ("名古屋", 35.1815, 136.9066, 20.0),
            ("金沢", 36.5613, 136.6562, 12.0),
            ("札幌", 43.0618, 141.3545, 20.0),
            ("函館", 41.7687, 140.7288, 12.0),
            ("仙台", 38.2682, 140.8694, 18.0),
            ("広島", 34.3853, 132.4553, 15.0),
            ("福岡", 33.5902, 130.4017, 18.0),
            ("長崎", 32.7503, 129.8777, 12.0),
            ("那覇", 26.2124, 127.6809, 15.0),
            ("ソウル", 37.5665, 126.9780, 25.0),
            ("台北", 25.0330, 121.5654, 20.0),
            ("香港", 22.3193, 114.1694, 25.0),
            ("バンコク", 13.7563, 100.5018, 30.0),
            ("シンガポール", 1.3521, 103.8198, 25.0),
            ("シドニー", -33.8688, 151.2093, 30.0),
            ("ホノルル", 21.3069, -157.8583, 20.0),
            ("サンフランシスコ", 37.7749, -122.4194, 20.0),
            ("ロサンゼルス", 34.0522, -118.2437, 35.0),
            ("ニューヨーク", 40.7128, -74.0060, 30.0),
            ("ロンドン", 51.5074, -0.1278, 30.0),
            ("パリ", 48.8566, 2.3522, 25.0),
            ("ローマ", 41.9028, 12.4964, 20.0),
            ("バルセロナ", 41.3874, 2.1686, 15.0),
        ]
        .into_iter()
        .map(|(name, lat, lon, radius)| Place::new(name, lat, lon, radius))
        .collect();

        Self { places }
    }

    /// Nearest covering place, if any
    pub fn lookup(&self, latitude: f64, longitude: f64) -> Option<&Place> {
        self.places
            .iter()
            .map(|place| {
                (
                    place,
                    haversine_km(latitude, longitude, place.latitude, place.longitude),
                )
            })
            .filter(|(place, distance)| *distance <= place.radius_km)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(place, _)| place)
    }
}

#[async_trait]
impl ReverseGeocoder for StaticGazetteer {
    async fn locality(&self, latitude: f64, longitude: f64) -> Option<String> {
        self.lookup(latitude, longitude).map(|p| p.name.clone())
    }
}

/// Great-circle distance in kilometers
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

// ============================================================================
// Heuristic Tagger
// ============================================================================

/// Produces EXIF heuristic tags for a photo
pub struct ExifHeuristics {
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl Default for ExifHeuristics {
    fn default() -> Self {
        Self::new(Arc::new(StaticGazetteer::builtin()))
    }
}

impl ExifHeuristics {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self { geocoder }
    }

    /// Tags derived from already-parsed metadata
    pub async fn tags_for(&self, metadata: &PhotoMetadata) -> Vec<String> {
        let mut tags = Vec::new();

        if let Some(vendor) = vendor_tag(metadata.make.as_deref(), metadata.model.as_deref()) {
            tags.push(vendor.to_string());
        }

        if let Some(captured_at) = metadata.captured_at {
            tags.extend(season_tag(chrono::Datelike::month(&captured_at)).map(str::to_string));
            tags.extend(time_of_day_tag(captured_at.hour()).map(str::to_string));
        }

        if let Some((lat, lon)) = metadata.coordinates() {
            if let Some(place) = self.geocoder.locality(lat, lon).await {
                tags.push(place);
            }
        }

        tags
    }

    /// Tags for encoded image bytes (empty when there is no EXIF)
    pub async fn tags_for_image(&self, image: &[u8]) -> Vec<String> {
        match PhotoMetadata::from_image_bytes(image) {
            Some(metadata) => self.tags_for(&metadata).await,
            None => Vec::new(),
        }
    }
}
