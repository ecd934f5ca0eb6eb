use std::fmt;

use serde::{Deserialize, Serialize};

/// Optional per-face analysis stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Mask,
    RgbLiveness,
    InteractionLiveness,
    Age,
    Gender,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Mask,
        Capability::RgbLiveness,
        Capability::InteractionLiveness,
        Capability::Age,
        Capability::Gender,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Mask => "mask",
            Capability::RgbLiveness => "rgb_liveness",
            Capability::InteractionLiveness => "interaction_liveness",
            Capability::Age => "age",
            Capability::Gender => "gender",
        }
    }

    /// Whether the stage classifies the aligned 112x112 face rather than an
    /// expanded box crop.
    pub fn uses_aligned_crop(self) -> bool {
        !matches!(self, Capability::RgbLiveness)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde_name() {
        for cap in Capability::ALL {
            let json = serde_json::to_string(&cap).unwrap();
            assert_eq!(json, format!("\"{cap}\""));
        }
    }
}
