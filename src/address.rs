use serde::{Deserialize, Serialize};

/// A resolved geographic position. "Not yet geocoded" is expressed as
/// `Option<Coordinates>::None`; the legacy `(0,0)` sentinel never leaves the
/// serialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A venue address as delivered by the upstream feed. `street_address` may be
/// empty: some venues are described only by a landmark name in
/// `disambiguating_description`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub address_locality: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disambiguating_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl Address {
    /// An address can be geocoded once it carries a postal code and a
    /// locality; the street line is optional.
    pub fn is_valid(&self) -> bool {
        !self.postal_code.is_empty() && !self.address_locality.is_empty()
    }

    /// Coordinates carried by this address, if any. Upstream and legacy cache
    /// snapshots use a literal `(0,0)` pair to mean "unset"; that pair maps to
    /// `None` here so the rest of the pipeline never compares against zero.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => {
                Some(Coordinates::new(lat, lon))
            }
            _ => None,
        }
    }

    pub fn set_coordinates(&mut self, coordinates: Option<Coordinates>) {
        self.latitude = coordinates.map(|c| c.latitude);
        self.longitude = coordinates.map(|c| c.longitude);
    }

    /// Deduplication key for geocode lookups, independent of which tournament
    /// references the venue. Case-sensitive, whitespace-insensitive.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.street_address.trim(),
            self.postal_code.trim(),
            self.address_locality.trim()
        )
    }

    /// Canonical single-line form sent to the geocoding backends. When the
    /// street line is empty or carries no house number (no space), the
    /// landmark description is prepended so "Gymnase Léo Lagrange"-style
    /// venues still resolve.
    pub fn full_address(&self) -> String {
        let street = self.street_address.trim();
        let landmark = self.disambiguating_description.trim();

        let mut line = street.to_string();
        if (street.is_empty() || !street.contains(' ')) && !landmark.is_empty() {
            line = if street.is_empty() {
                landmark.to_string()
            } else {
                format!("{landmark} {street}")
            };
        }

        format!(
            "{}, {} {}, France",
            line.trim(),
            self.postal_code.trim(),
            self.address_locality.trim()
        )
    }
}
