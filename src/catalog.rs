use tracing::debug;

use crate::{
    error::{Result, SimError},
    types::{ChargerProfile, ProfileSelection, SessionConfig, RAW_UNITS_PER_AMP},
};

/// Fixed Gentle profile
pub const GENTLE: ChargerProfile = ChargerProfile::new(150, 2500);
/// Fixed Normal profile
pub const NORMAL: ChargerProfile = ChargerProfile::new(300, 6000);
/// Fixed Aggressive profile
pub const AGGRESSIVE: ChargerProfile = ChargerProfile::new(450, 9000);

/// Convert raw units to amps at full precision
#[must_use]
pub fn raw_to_amps(raw: u32) -> f64 {
    f64::from(raw) / RAW_UNITS_PER_AMP
}

/// Convert amps to raw units, rounding half up
///
/// Returns `None` for negative, non-finite or out-of-range input.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn amps_to_raw(amps: f64) -> Option<u32> {
    if !amps.is_finite() || amps < 0.0 {
        return None;
    }
    let raw = (amps * RAW_UNITS_PER_AMP).round();
    if raw > f64::from(u32::MAX) {
        return None;
    }
    Some(raw as u32)
}

/// Amps text for a raw field, or `None` if the raw text is not a usable value
#[must_use]
pub fn sync_from_raw(raw_text: &str) -> Option<String> {
    let raw = raw_text.trim().parse::<u32>().ok()?;
    Some(format!("{:.2}", raw_to_amps(raw)))
}

/// Raw text for an amps field, or `None` if the amps text is not a usable value
#[must_use]
pub fn sync_from_amps(amps_text: &str) -> Option<String> {
    let amps = amps_text.trim().parse::<f64>().ok()?;
    amps_to_raw(amps).map(|raw| raw.to_string())
}

/// Editable text fields backing the Custom profile
///
/// The raw fields are the source of truth; the amps fields are a convenience
/// view kept in step when a field loses focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProfileEditor {
    /// Cutoff in raw units as typed
    pub cutoff_raw: String,
    /// Cutoff in amps as typed
    pub cutoff_amps: String,
    /// Max in raw units as typed
    pub max_raw: String,
    /// Max in amps as typed
    pub max_amps: String,
}

impl Default for CustomProfileEditor {
    fn default() -> Self {
        Self {
            cutoff_raw: "300".to_string(),
            cutoff_amps: "0.30".to_string(),
            max_raw: "6000".to_string(),
            max_amps: "6.00".to_string(),
        }
    }
}

impl CustomProfileEditor {
    /// Recompute both amps fields from the raw fields
    ///
    /// A field whose raw text does not parse keeps its previous amps text.
    pub fn commit_raw_fields(&mut self) {
        if let Some(amps) = sync_from_raw(&self.cutoff_raw) {
            self.cutoff_amps = amps;
        }
        if let Some(amps) = sync_from_raw(&self.max_raw) {
            self.max_amps = amps;
        }
    }

    /// Recompute both raw fields from the amps fields
    pub fn commit_amps_fields(&mut self) {
        if let Some(raw) = sync_from_amps(&self.cutoff_amps) {
            self.cutoff_raw = raw;
        }
        if let Some(raw) = sync_from_amps(&self.max_amps) {
            self.max_raw = raw;
        }
    }

    /// Parse and bound-check the raw fields
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidProfile`] if either field is not an integer,
    /// the cutoff is negative, the max is not positive, or either exceeds `limit`.
    pub fn parse(&self, limit: u32) -> Result<ChargerProfile> {
        let invalid = || {
            SimError::InvalidProfile(format!(
                "Invalid custom cutoff or max current values. \
                 Please enter positive integers less than {limit}."
            ))
        };

        let cutoff_raw = self.cutoff_raw.trim().parse::<i64>().map_err(|_| invalid())?;
        let max_raw = self.max_raw.trim().parse::<i64>().map_err(|_| invalid())?;

        if cutoff_raw < 0 || max_raw <= 0 {
            return Err(invalid());
        }
        if cutoff_raw > i64::from(limit) || max_raw > i64::from(limit) {
            return Err(invalid());
        }

        let cutoff_raw = u32::try_from(cutoff_raw).map_err(|_| invalid())?;
        let max_raw = u32::try_from(max_raw).map_err(|_| invalid())?;
        Ok(ChargerProfile::new(cutoff_raw, max_raw))
    }
}

/// Named charger profiles plus the operator's Custom profile
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    custom: CustomProfileEditor,
    custom_limit_raw: u32,
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl ProfileCatalog {
    /// Create a catalog with the default custom fields
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            custom: CustomProfileEditor::default(),
            custom_limit_raw: config.custom_limit_raw,
        }
    }

    /// Fixed values for a named profile, `None` for Custom
    #[must_use]
    pub const fn fixed(selection: ProfileSelection) -> Option<ChargerProfile> {
        match selection {
            ProfileSelection::Gentle => Some(GENTLE),
            ProfileSelection::Normal => Some(NORMAL),
            ProfileSelection::Aggressive => Some(AGGRESSIVE),
            ProfileSelection::Custom => None,
        }
    }

    /// Resolve a selection to the limits it installs
    ///
    /// Named profiles are returned as-is. Custom is read from the raw fields at
    /// call time and validated against the configured bound.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidProfile`] if the Custom fields are invalid.
    pub fn resolve(&self, selection: ProfileSelection) -> Result<ChargerProfile> {
        if let Some(profile) = Self::fixed(selection) {
            return Ok(profile);
        }
        let profile = self.custom.parse(self.custom_limit_raw)?;
        debug!("Resolved custom profile: {}", profile);
        Ok(profile)
    }

    /// Resolve a profile label such as `"Normal"`
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidProfile`] for unknown labels or invalid Custom fields.
    pub fn resolve_label(&self, label: &str) -> Result<ChargerProfile> {
        self.resolve(label.parse()?)
    }

    /// Operator-facing description of a selection
    #[must_use]
    pub fn describe(selection: ProfileSelection) -> String {
        Self::fixed(selection).map_or_else(
            || {
                "Profile 'Custom': use the fields below to set cutoff and max. \
                 Values are for protocol simulation only."
                    .to_string()
            },
            |profile| {
                format!(
                    "Profile '{selection}': Cutoff = {} ({:.2} A), Max = {} ({:.2} A). \
                     Simulation only. No real charging current flows.",
                    profile.cutoff_raw,
                    profile.cutoff_amps(),
                    profile.max_raw,
                    profile.max_amps()
                )
            },
        )
    }

    /// Custom profile fields
    #[must_use]
    pub const fn custom(&self) -> &CustomProfileEditor {
        &self.custom
    }

    /// Mutable access to the Custom profile fields
    pub fn custom_mut(&mut self) -> &mut CustomProfileEditor {
        &mut self.custom
    }
}
