//! Wave variable catalog.
//!
//! Descriptive metadata and valid data ranges for the GFS-Wave surface
//! variables. The normalizer fills in whatever the raw grid leaves out and
//! turns values outside the valid range (sentinels, decoding garbage) into
//! `NaN`.

use grid_processor::VariableInfo;

/// Valid data range for a variable. Values outside this range become `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    /// Minimum valid value (inclusive).
    pub min: f32,
    /// Maximum valid value (inclusive).
    pub max: f32,
}

impl ValidRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Check if a value is within the valid range. `NaN` never is.
    #[inline]
    pub fn is_valid(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One entry of the catalog.
#[derive(Debug, Clone, Copy)]
pub struct WaveVariable {
    pub name: &'static str,
    pub title: &'static str,
    pub standard_name: &'static str,
    pub units: &'static str,
    pub description: &'static str,
    pub valid_range: ValidRange,
}

impl WaveVariable {
    pub fn info(&self) -> VariableInfo {
        VariableInfo {
            title: self.title.to_string(),
            units: self.units.to_string(),
            description: self.description.to_string(),
            standard_name: self.standard_name.to_string(),
        }
    }
}

const HEIGHT: ValidRange = ValidRange::new(0.0, 50.0);
const PERIOD: ValidRange = ValidRange::new(0.0, 60.0);
const DIRECTION: ValidRange = ValidRange::new(0.0, 360.0);

static CATALOG: &[WaveVariable] = &[
    WaveVariable {
        name: "htsgwsfc",
        title: "Significant Wave Height",
        standard_name: "sea_surface_wave_significant_height",
        units: "m",
        description: "Average height of the highest one-third of waves, combined wind waves and swell",
        valid_range: HEIGHT,
    },
    WaveVariable {
        name: "perpwsfc",
        title: "Primary Wave Mean Period",
        standard_name: "sea_surface_wave_mean_period_from_variance_spectral_density_first_frequency_moment",
        units: "s",
        description: "Mean period of the primary wave component",
        valid_range: PERIOD,
    },
    WaveVariable {
        name: "dirpwsfc",
        title: "Primary Wave Direction",
        standard_name: "sea_surface_wave_from_direction",
        units: "degrees",
        description: "Direction the primary waves come from, clockwise from north",
        valid_range: DIRECTION,
    },
    WaveVariable {
        name: "wvhgtsfc",
        title: "Wind Wave Height",
        standard_name: "sea_surface_wind_wave_significant_height",
        units: "m",
        description: "Height of wind-generated waves",
        valid_range: HEIGHT,
    },
    WaveVariable {
        name: "wvpersfc",
        title: "Wind Wave Period",
        standard_name: "sea_surface_wind_wave_mean_period",
        units: "s",
        description: "Period of wind-generated waves",
        valid_range: PERIOD,
    },
    WaveVariable {
        name: "wvdirsfc",
        title: "Wind Wave Direction",
        standard_name: "sea_surface_wind_wave_from_direction",
        units: "degrees",
        description: "Direction wind waves come from",
        valid_range: DIRECTION,
    },
    WaveVariable {
        name: "swellsfc",
        title: "Swell Wave Height",
        standard_name: "sea_surface_swell_wave_significant_height",
        units: "m",
        description: "Height of long-period waves generated far away",
        valid_range: HEIGHT,
    },
    WaveVariable {
        name: "swpersfc",
        title: "Swell Wave Period",
        standard_name: "sea_surface_swell_wave_mean_period",
        units: "s",
        description: "Period of swell waves",
        valid_range: PERIOD,
    },
    WaveVariable {
        name: "swdirsfc",
        title: "Swell Wave Direction",
        standard_name: "sea_surface_swell_wave_from_direction",
        units: "degrees",
        description: "Direction swell waves come from",
        valid_range: DIRECTION,
    },
];

/// All known wave variables.
pub fn catalog() -> &'static [WaveVariable] {
    CATALOG
}

/// Look up a variable by its short name (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static WaveVariable> {
    CATALOG.iter().find(|v| v.name.eq_ignore_ascii_case(name))
}

/// Names ingested when no explicit list is configured.
pub fn default_variables() -> Vec<String> {
    CATALOG.iter().map(|v| v.name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range_is_valid() {
        let range = ValidRange::new(0.0, 50.0);
        assert!(range.is_valid(0.0));
        assert!(range.is_valid(50.0));
        assert!(!range.is_valid(-0.1));
        assert!(!range.is_valid(9.999e20));
        assert!(!range.is_valid(f32::NAN));
    }

    #[test]
    fn test_lookup() {
        let hs = lookup("HTSGWSFC").unwrap();
        assert_eq!(hs.units, "m");
        assert_eq!(hs.info().title, "Significant Wave Height");
        assert!(lookup("tmp2m").is_none());
    }

    #[test]
    fn test_default_variables_cover_catalog() {
        let names = default_variables();
        assert_eq!(names.len(), catalog().len());
        assert_eq!(names[0], "htsgwsfc");
    }
}
