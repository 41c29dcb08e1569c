use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Angle {
    Front,
    Back,
    Side,
    ThreeQuarter,
    Detail,
    Top,
}

pub const DEFAULT_ANGLE: Angle = Angle::Front;

pub const ALL_ANGLES: &[Angle] = &[
    Angle::Front,
    Angle::Back,
    Angle::Side,
    Angle::ThreeQuarter,
    Angle::Detail,
    Angle::Top,
];

impl Angle {
    pub fn token(&self) -> &'static str {
        match self {
            Angle::Front => "front",
            Angle::Back => "back",
            Angle::Side => "side",
            Angle::ThreeQuarter => "three_quarter",
            Angle::Detail => "detail",
            Angle::Top => "top",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Angle::Front => "Front",
            Angle::Back => "Back",
            Angle::Side => "Side profile",
            Angle::ThreeQuarter => "Three-quarter",
            Angle::Detail => "Detail close-up",
            Angle::Top => "Top-down",
        }
    }

    pub fn from_token(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "front" => Some(Angle::Front),
            "back" | "rear" => Some(Angle::Back),
            "side" | "profile" => Some(Angle::Side),
            "three_quarter" | "three-quarter" | "3/4" | "45" | "angled" => {
                Some(Angle::ThreeQuarter)
            }
            "detail" | "closeup" | "close-up" => Some(Angle::Detail),
            "top" | "overhead" | "flat" => Some(Angle::Top),
            _ => None,
        }
    }

    /// Camera instruction appended to the generation prompt.
    pub fn directive(&self) -> &'static str {
        match self {
            Angle::Front => {
                "Show the product straight-on from the front, centered, with the full item in \
                 frame."
            }
            Angle::Back => {
                "Show the back of the product, rotated 180 degrees from the front view, full \
                 item in frame."
            }
            Angle::Side => {
                "Show the product in strict side profile, rotated 90 degrees from the front view."
            }
            Angle::ThreeQuarter => {
                "Show the product from a three-quarter angle, rotated about 45 degrees from the \
                 front view."
            }
            Angle::Detail => {
                "Show a tight close-up of the most distinctive material, texture, or hardware \
                 detail."
            }
            Angle::Top => {
                "Show the product from directly overhead, laid flat and squared to the frame."
            }
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Unknown tokens are dropped, duplicates collapse to their first position,
/// and an empty result falls back to [`DEFAULT_ANGLE`].
pub fn normalize_angles<S: AsRef<str>>(raw: &[S]) -> Vec<Angle> {
    let mut out = Vec::new();
    for token in raw {
        let Some(angle) = Angle::from_token(token.as_ref()) else {
            continue;
        };
        if !out.contains(&angle) {
            out.push(angle);
        }
    }
    if out.is_empty() {
        out.push(DEFAULT_ANGLE);
    }
    out
}

/// `angles[]` wins over the single `targetAngle` field when it yields anything usable.
pub fn normalize_angle_inputs(target_angle: Option<&str>, angles: Option<&[String]>) -> Vec<Angle> {
    let listed: Vec<&str> = angles
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .filter(|token| Angle::from_token(token).is_some())
        .collect();
    if !listed.is_empty() {
        return normalize_angles(&listed);
    }
    match target_angle {
        Some(token) => normalize_angles(&[token]),
        None => vec![DEFAULT_ANGLE],
    }
}

pub fn angle_tokens() -> Vec<&'static str> {
    ALL_ANGLES.iter().map(Angle::token).collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize_angle_inputs, normalize_angles, Angle, DEFAULT_ANGLE};

    #[test]
    fn empty_input_defaults_to_front() {
        let empty: [&str; 0] = [];
        assert_eq!(normalize_angles(&empty), vec![DEFAULT_ANGLE]);
        assert_eq!(normalize_angle_inputs(None, None), vec![Angle::Front]);
    }

    #[test]
    fn unknown_tokens_are_dropped_and_duplicates_collapse() {
        let raw = ["  BACK", "sideways", "front", "back", "3/4", "", "three_quarter"];
        assert_eq!(
            normalize_angles(&raw),
            vec![Angle::Back, Angle::Front, Angle::ThreeQuarter]
        );
    }

    #[test]
    fn only_unknown_tokens_fall_back_to_default() {
        assert_eq!(normalize_angles(&["upside", "???"]), vec![Angle::Front]);
    }

    #[test]
    fn angle_list_takes_priority_over_target_angle() {
        let listed = vec!["detail".to_string(), "top".to_string()];
        assert_eq!(
            normalize_angle_inputs(Some("back"), Some(&listed)),
            vec![Angle::Detail, Angle::Top]
        );
    }

    #[test]
    fn unusable_list_falls_through_to_target_angle() {
        let listed = vec!["nope".to_string()];
        assert_eq!(
            normalize_angle_inputs(Some("side"), Some(&listed)),
            vec![Angle::Side]
        );
        assert_eq!(
            normalize_angle_inputs(Some("bogus"), Some(&listed)),
            vec![Angle::Front]
        );
    }

    #[test]
    fn tokens_round_trip_through_from_token() {
        for angle in super::ALL_ANGLES {
            assert_eq!(Angle::from_token(angle.token()), Some(*angle));
        }
    }
}
