//! Recipe and audit records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use errors::{VulcanError, VulcanResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type RecipeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeStatus {
    /// No activation time
    Draft,
    /// Waiting for `scheduled_at`
    Pending,
    /// Terminal
    Activated,
    /// Gave up after repeated activation failures; re-scheduling returns it to pending
    Failed,
}

impl RecipeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeStatus::Draft => "draft",
            RecipeStatus::Pending => "pending",
            RecipeStatus::Activated => "activated",
            RecipeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeStatus {
    type Err = VulcanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RecipeStatus::Draft),
            "pending" => Ok(RecipeStatus::Pending),
            "activated" => Ok(RecipeStatus::Activated),
            "failed" => Ok(RecipeStatus::Failed),
            other => Err(VulcanError::Persistence(format!(
                "unknown recipe status '{}'",
                other
            ))),
        }
    }
}

/// Process parameters of a curing cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeParams {
    pub name: String,

    pub curing_temp: f64,
    pub temp_band_plus: f64,
    pub temp_band_minus: f64,

    pub pressure: f64,
    pub pressure_band_plus: f64,
    pub pressure_band_minus: f64,

    pub curing_time: f64,
    pub exhaust_delay: f64,
    pub purging_cycles: i32,

    // Purge stages 1..5
    pub high1: f64,
    pub low1: f64,
    pub high2: f64,
    pub low2: f64,
    pub high3: f64,
    pub low3: f64,
    pub high4: f64,
    pub low4: f64,
    pub high5: f64,
    pub low5: f64,
}

fn require(ok: bool, field: &str, reason: &str) -> VulcanResult<()> {
    if ok {
        Ok(())
    } else {
        Err(VulcanError::validation(field, reason))
    }
}

impl RecipeParams {
    /// Check the parameter invariants, naming the first offending field
    pub fn validate(&self) -> VulcanResult<()> {
        require(!self.name.trim().is_empty(), "name", "is required")?;
        require(self.curing_temp > 0.0, "curingTemp", "must be greater than 0")?;
        require(self.temp_band_plus >= 0.0, "tempBandPlus", "must not be negative")?;
        require(self.temp_band_minus >= 0.0, "tempBandMinus", "must not be negative")?;
        require(self.pressure >= 0.0, "pressure", "must not be negative")?;
        require(
            self.pressure_band_plus >= 0.0,
            "pressureBandPlus",
            "must not be negative",
        )?;
        require(
            self.pressure_band_minus >= 0.0,
            "pressureBandMinus",
            "must not be negative",
        )?;
        require(self.curing_time > 0.0, "curingTime", "must be greater than 0")?;
        require(self.exhaust_delay >= 0.0, "exhaustDelay", "must not be negative")?;
        require(self.purging_cycles >= 0, "purgingCycles", "must not be negative")?;

        let numbers = [
            ("curingTemp", self.curing_temp),
            ("tempBandPlus", self.temp_band_plus),
            ("tempBandMinus", self.temp_band_minus),
            ("pressure", self.pressure),
            ("pressureBandPlus", self.pressure_band_plus),
            ("pressureBandMinus", self.pressure_band_minus),
            ("curingTime", self.curing_time),
            ("exhaustDelay", self.exhaust_delay),
            ("high1", self.high1),
            ("low1", self.low1),
            ("high2", self.high2),
            ("low2", self.low2),
            ("high3", self.high3),
            ("low3", self.low3),
            ("high4", self.high4),
            ("low4", self.low4),
            ("high5", self.high5),
            ("low5", self.low5),
        ];
        for (field, value) in numbers {
            require(value.is_finite(), field, "must be a finite number")?;
        }
        Ok(())
    }

    /// Parameters frozen into the `recipe-activated` audit entry
    pub fn activation_snapshot(&self) -> Value {
        json!({
            "curingTemp": self.curing_temp,
            "tempBandPlus": self.temp_band_plus,
            "tempBandMinus": self.temp_band_minus,
            "pressure": self.pressure,
            "pressureBandPlus": self.pressure_band_plus,
            "pressureBandMinus": self.pressure_band_minus,
            "curingTime": self.curing_time,
            "exhaustDelay": self.exhaust_delay,
            "purgingCycles": self.purging_cycles,
        })
    }
}

/// Row version a compare-and-swap write checks against the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    #[serde(flatten)]
    pub params: RecipeParams,
    pub status: RecipeStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every write
    #[serde(skip)]
    pub version: i64,
}

impl Recipe {
    pub fn revision(&self) -> Revision {
        Revision {
            version: self.version,
        }
    }

    /// JSON snapshot used in audit payloads and push events
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "id": self.id }))
    }
}

/// Row to insert; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub params: RecipeParams,
    pub status: RecipeStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Replacement values for an existing recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeUpdate {
    #[serde(flatten)]
    pub params: RecipeParams,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Requested status; ignored when the update introduces a schedule
    #[serde(default)]
    pub status: Option<RecipeStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    RecipeCreated,
    RecipeUpdated,
    RecipeDeleted,
    RecipeActivated,
    RecipeActivationFailed,
    RecipeActivationAbandoned,
    RecipeDeliveryFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RecipeCreated => "recipe-created",
            AuditAction::RecipeUpdated => "recipe-updated",
            AuditAction::RecipeDeleted => "recipe-deleted",
            AuditAction::RecipeActivated => "recipe-activated",
            AuditAction::RecipeActivationFailed => "recipe-activation-failed",
            AuditAction::RecipeActivationAbandoned => "recipe-activation-abandoned",
            AuditAction::RecipeDeliveryFailed => "recipe-delivery-failed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = VulcanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AuditAction::RecipeCreated,
            AuditAction::RecipeUpdated,
            AuditAction::RecipeDeleted,
            AuditAction::RecipeActivated,
            AuditAction::RecipeActivationFailed,
            AuditAction::RecipeActivationAbandoned,
            AuditAction::RecipeDeliveryFailed,
        ]
        .into_iter()
        .find(|action| action.as_str() == s)
        .ok_or_else(|| VulcanError::Persistence(format!("unknown audit action '{}'", s)))
    }
}

/// Entry not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: AuditAction,
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: AuditAction,
    pub details: Value,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_params(name: &str) -> RecipeParams {
        RecipeParams {
            name: name.to_string(),
            curing_temp: 160.0,
            temp_band_plus: 2.0,
            temp_band_minus: 2.0,
            pressure: 150.0,
            pressure_band_plus: 5.0,
            pressure_band_minus: 5.0,
            curing_time: 12.0,
            exhaust_delay: 3.0,
            purging_cycles: 2,
            high1: 120.0,
            low1: 20.0,
            high2: 110.0,
            low2: 20.0,
            high3: 100.0,
            low3: 15.0,
            high4: 90.0,
            low4: 15.0,
            high5: 80.0,
            low5: 10.0,
        }
    }

    #[test]
    fn test_params_serialize_camel_case() {
        let value = serde_json::to_value(sample_params("Tyre A")).unwrap();
        assert_eq!(value["curingTemp"], 160.0);
        assert_eq!(value["pressureBandMinus"], 5.0);
        assert_eq!(value["purgingCycles"], 2);
        assert_eq!(value["high5"], 80.0);
    }

    #[test]
    fn test_validation_names_field() {
        let mut params = sample_params("");
        let err = params.validate().unwrap_err();
        assert!(matches!(err, VulcanError::Validation { ref field, .. } if field == "name"));

        params.name = "Tyre A".into();
        params.curing_time = 0.0;
        let err = params.validate().unwrap_err();
        assert!(matches!(err, VulcanError::Validation { ref field, .. } if field == "curingTime"));

        params.curing_time = 10.0;
        params.purging_cycles = -1;
        assert!(params.validate().is_err());

        params.purging_cycles = 0;
        params.pressure = 0.0;
        assert!(params.validate().is_ok());

        params.low3 = f64::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_status_and_action_strings() {
        for status in [
            RecipeStatus::Draft,
            RecipeStatus::Pending,
            RecipeStatus::Activated,
            RecipeStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RecipeStatus>().unwrap(), status);
        }
        assert_eq!(
            "recipe-activation-failed".parse::<AuditAction>().unwrap(),
            AuditAction::RecipeActivationFailed
        );
        assert_eq!(
            serde_json::to_value(AuditAction::RecipeDeliveryFailed).unwrap(),
            "recipe-delivery-failed"
        );
        assert!("recipe-exploded".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_recipe_snapshot_is_flat() {
        let recipe = Recipe {
            id: 7,
            params: sample_params("Tyre A"),
            status: RecipeStatus::Pending,
            scheduled_at: None,
            created_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            activated_at: None,
            version: 3,
        };
        let snapshot = recipe.snapshot();
        assert_eq!(snapshot["id"], 7);
        assert_eq!(snapshot["name"], "Tyre A");
        assert_eq!(snapshot["status"], "pending");
        assert!(snapshot["scheduledAt"].is_null());
        assert!(snapshot.get("activatedAt").is_none());
        assert!(snapshot.get("version").is_none());
    }
}
