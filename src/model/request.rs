//! Quote request types: the raw queue body, its validated form, and the
//! enumerations the site accepts.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// City
// ---------------------------------------------------------------------------

/// Cities the estimate form serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum City {
    Bangalore,
    Mumbai,
    Delhi,
    Chennai,
    Hyderabad,
    Pune,
}

impl City {
    pub const ALL: [City; 6] = [
        City::Bangalore,
        City::Mumbai,
        City::Delhi,
        City::Chennai,
        City::Hyderabad,
        City::Pune,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            City::Bangalore => "Bangalore",
            City::Mumbai => "Mumbai",
            City::Delhi => "Delhi",
            City::Chennai => "Chennai",
            City::Hyderabad => "Hyderabad",
            City::Pune => "Pune",
        }
    }
}

impl std::fmt::Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for City {
    type Err = Error;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        City::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let supported: Vec<_> = City::ALL.iter().map(|c| c.as_str()).collect();
                Error::Validation(format!(
                    "city '{s}' is not supported (supported: {})",
                    supported.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Service type
// ---------------------------------------------------------------------------

/// Category of vehicle service to quote for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[default]
    Trucks,
    TwoWheelers,
    PackersAndMovers,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [
        ServiceType::Trucks,
        ServiceType::TwoWheelers,
        ServiceType::PackersAndMovers,
    ];

    /// Wire name, as it appears in message bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Trucks => "trucks",
            ServiceType::TwoWheelers => "two_wheelers",
            ServiceType::PackersAndMovers => "packers_and_movers",
        }
    }

    /// Label shown on the site's category selector.
    pub fn label(self) -> &'static str {
        match self {
            ServiceType::Trucks => "Trucks",
            ServiceType::TwoWheelers => "Two Wheelers",
            ServiceType::PackersAndMovers => "Packers & Movers",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        ServiceType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let supported: Vec<_> = ServiceType::ALL.iter().map(|t| t.as_str()).collect();
                Error::Validation(format!(
                    "service type '{s}' is not supported (supported: {})",
                    supported.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Phone
// ---------------------------------------------------------------------------

/// A ten-digit phone number with no country code or separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Validate a phone number. Surrounding whitespace is trimmed; anything
    /// else that is not exactly ten ASCII digits is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == 10 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::Validation(
                "phone number must be exactly 10 digits, without country code, spaces or separators"
                    .to_string(),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Validated request
// ---------------------------------------------------------------------------

/// A quote request whose identity, city and service type have been validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteRequest {
    pub name: String,
    pub phone: Phone,
    pub pickup_address: String,
    pub drop_address: String,
    pub city: City,
    pub service_type: ServiceType,
}

impl QuoteRequest {
    /// Validate raw request fields. A missing service type means trucks.
    pub fn parse(
        name: &str,
        phone: &str,
        pickup_address: &str,
        drop_address: &str,
        city: &str,
        service_type: Option<&str>,
    ) -> Result<Self> {
        let service_type = match service_type.map(str::trim) {
            None | Some("") => ServiceType::default(),
            Some(s) => s.parse()?,
        };
        Ok(Self {
            name: name.trim().to_string(),
            phone: Phone::parse(phone)?,
            pickup_address: pickup_address.trim().to_string(),
            drop_address: drop_address.trim().to_string(),
            city: city.parse()?,
            service_type,
        })
    }
}

/// Body of the synchronous `POST /quote` endpoint: a work item without the
/// producer's correlation fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequestBody {
    #[serde(default)]
    pub name: String,
    pub phone: String,
    pub pickup_address: String,
    pub drop_address: String,
    pub city: String,
    #[serde(default)]
    pub service_type: Option<String>,
}

impl QuoteRequestBody {
    pub fn validate(&self) -> Result<QuoteRequest> {
        QuoteRequest::parse(
            &self.name,
            &self.phone,
            &self.pickup_address,
            &self.drop_address,
            &self.city,
            self.service_type.as_deref(),
        )
    }
}

// ---------------------------------------------------------------------------
// Queue work item
// ---------------------------------------------------------------------------

/// Correlation identifiers supplied by the upstream producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "reference_id")]
    pub id: String,
    #[serde(rename = "reference_type")]
    pub kind: String,
}

/// A queue message body, decoded leniently so that absent fields can be
/// reported rather than failing the decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl WorkItem {
    /// Decode a raw message body.
    pub fn decode(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Required fields that are absent or blank. Without these the item can
    /// never be actioned, however often it is retried.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("pickup_address", &self.pickup_address),
            ("drop_address", &self.drop_address),
            ("reference_id", &self.reference_id),
            ("reference_type", &self.reference_type),
        ]
        .into_iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn reference_id(&self) -> Option<&str> {
        present(&self.reference_id)
    }

    /// Check required fields, then validate into a request and its reference.
    pub fn validate(&self) -> Result<(QuoteRequest, Reference)> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(Error::MissingFields(missing));
        }

        let phone = present(&self.phone)
            .ok_or_else(|| Error::Validation("phone is required".to_string()))?;
        let city =
            present(&self.city).ok_or_else(|| Error::Validation("city is required".to_string()))?;

        let request = QuoteRequest::parse(
            self.name.as_deref().unwrap_or_default(),
            phone,
            present(&self.pickup_address).unwrap_or_default(),
            present(&self.drop_address).unwrap_or_default(),
            city,
            self.service_type.as_deref(),
        )?;
        let reference = Reference {
            id: present(&self.reference_id).unwrap_or_default().to_string(),
            kind: present(&self.reference_type).unwrap_or_default().to_string(),
        };
        Ok((request, reference))
    }
}
