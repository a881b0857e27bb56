//! Configuration for ranked collections

use crate::domain::errors::ConfigError;
use crate::domain::value_objects::{CollectionId, FieldKind, NewItemPlacement, Rank, RankPrecision};
use serde::{Deserialize, Serialize};
use std::env;

/// Ranking configuration, supplied once per collection.
///
/// The partition definition is passed to the builder separately since
/// predicate scopes carry closures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankedListConfig {
    /// Collection ("record type") the modes of the context controller key on
    pub collection: String,
    /// Name of the numeric rank field in the record store
    pub rank_field: String,
    /// Stamp the tiebreak attribute of every renumbered record during a spread
    pub touch_on_update: bool,
    /// Spacing after a spread and anchor of boundary placements
    pub step_increment: f64,
    /// Default for collision detection; scoped overrides take precedence
    pub avoid_collisions: bool,
    /// Placement of records created without a rank
    pub new_item_at: NewItemPlacement,
}

impl Default for RankedListConfig {
    fn default() -> Self {
        Self {
            collection: "ranked_items".to_string(),
            rank_field: "rank".to_string(),
            touch_on_update: true,
            step_increment: 1024.0,
            avoid_collisions: true,
            new_item_at: NewItemPlacement::Lowest,
        }
    }
}

impl RankedListConfig {
    /// Defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RANKED_LIST_COLLECTION`: collection name (default: ranked_items)
    /// - `RANKED_LIST_RANK_FIELD`: rank field (default: rank)
    /// - `RANKED_LIST_TOUCH_ON_UPDATE`: `true`/`false` (default: true)
    /// - `RANKED_LIST_STEP_INCREMENT`: positive number (default: 1024)
    /// - `RANKED_LIST_AVOID_COLLISIONS`: `true`/`false` (default: true)
    /// - `RANKED_LIST_NEW_ITEM_AT`: `highest`, `lowest` or `unranked` (default: lowest)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("RANKED_LIST_COLLECTION") {
            config.collection = value;
        }
        if let Some(value) = lookup("RANKED_LIST_RANK_FIELD") {
            config.rank_field = value;
        }
        if let Some(value) = lookup("RANKED_LIST_TOUCH_ON_UPDATE") {
            config.touch_on_update = parse_flag("RANKED_LIST_TOUCH_ON_UPDATE", &value)?;
        }
        if let Some(value) = lookup("RANKED_LIST_STEP_INCREMENT") {
            config.step_increment = value
                .trim()
                .parse()
                .map_err(|_| invalid_env("RANKED_LIST_STEP_INCREMENT", &value))?;
        }
        if let Some(value) = lookup("RANKED_LIST_AVOID_COLLISIONS") {
            config.avoid_collisions = parse_flag("RANKED_LIST_AVOID_COLLISIONS", &value)?;
        }
        if let Some(value) = lookup("RANKED_LIST_NEW_ITEM_AT") {
            config.new_item_at = match value.trim().to_lowercase().as_str() {
                "highest" => NewItemPlacement::Highest,
                "lowest" => NewItemPlacement::Lowest,
                "unranked" => NewItemPlacement::Unranked,
                _ => return Err(invalid_env("RANKED_LIST_NEW_ITEM_AT", &value)),
            };
        }

        Ok(config)
    }

    /// Checks that do not need the record store.
    pub fn validate(&self) -> Result<Rank, ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::EmptyCollection);
        }
        if self.rank_field.trim().is_empty() {
            return Err(ConfigError::EmptyRankField);
        }
        if !self.step_increment.is_finite() || self.step_increment <= 0.0 {
            return Err(ConfigError::InvalidStepIncrement(self.step_increment));
        }
        Rank::from_f64(self.step_increment)
            .filter(|step| step.is_positive())
            .ok_or(ConfigError::InvalidStepIncrement(self.step_increment))
    }

    /// Validate against the introspected type of the rank field.
    ///
    /// `field` is `None` when the record store has no such field.
    pub fn resolve(&self, field: Option<FieldKind>) -> Result<RankSettings, ConfigError> {
        let step = self.validate()?;

        let kind = field.ok_or_else(|| ConfigError::RankFieldMissing(self.rank_field.clone()))?;
        if !kind.is_numeric() {
            return Err(ConfigError::RankFieldNotNumeric {
                field: self.rank_field.clone(),
                kind,
            });
        }

        let precision = RankPrecision::for_field(kind);
        if precision == RankPrecision::Integer && !step.is_integer() {
            return Err(ConfigError::FractionalStepForIntegerField(self.step_increment));
        }

        Ok(RankSettings {
            collection: CollectionId::new(self.collection.clone()),
            rank_field: self.rank_field.clone(),
            step,
            precision,
            touch_on_update: self.touch_on_update,
            avoid_collisions: self.avoid_collisions,
            new_item_at: self.new_item_at,
        })
    }
}

/// Validated configuration in the form the service works with.
#[derive(Clone, Debug, PartialEq)]
pub struct RankSettings {
    pub collection: CollectionId,
    pub rank_field: String,
    pub step: Rank,
    pub precision: RankPrecision,
    pub touch_on_update: bool,
    pub avoid_collisions: bool,
    pub new_item_at: NewItemPlacement,
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid_env(var, value)),
    }
}

fn invalid_env(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    }
}
