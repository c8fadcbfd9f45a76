use serde::{Deserialize, Serialize};
use std::{fmt, ops::Add, str::FromStr};

pub const TRASH_LABWARE: &str = "fixed_trash";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn z(z: f64) -> Self {
        Self { x: 0.0, y: 0.0, z }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// A single addressable container: one well of one labware item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WellId {
    pub labware: String,
    pub well: String,
}

impl WellId {
    pub fn new(labware: &str, well: &str) -> Self {
        Self {
            labware: labware.to_string(),
            well: well.to_string(),
        }
    }

    pub fn trash() -> Self {
        Self::new(TRASH_LABWARE, "A1")
    }

    pub fn is_trash(&self) -> bool {
        self.labware == TRASH_LABWARE
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.labware, self.well)
    }
}

impl FromStr for WellId {
    type Err = String;

    /// Parses the `labware:well` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((labware, well)) if !labware.trim().is_empty() && !well.trim().is_empty() => {
                Ok(Self::new(labware.trim(), well.trim()))
            }
            _ => Err(format!("Expected 'labware:well', got '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Top,
    Bottom,
}

impl Anchor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// A position relative to a well reference point. The driver resolves it to
/// deck coordinates; the core only composes offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub well: WellId,
    pub anchor: Anchor,
    #[serde(default)]
    pub offset: Point,
}

impl Location {
    pub fn top(well: &WellId) -> Self {
        Self::top_z(well, 0.0)
    }

    pub fn top_z(well: &WellId, z: f64) -> Self {
        Self {
            well: well.clone(),
            anchor: Anchor::Top,
            offset: Point::z(z),
        }
    }

    pub fn bottom(well: &WellId) -> Self {
        Self::bottom_z(well, 0.0)
    }

    pub fn bottom_z(well: &WellId, z: f64) -> Self {
        Self {
            well: well.clone(),
            anchor: Anchor::Bottom,
            offset: Point::z(z),
        }
    }

    pub fn moved(&self, delta: Point) -> Self {
        Self {
            well: self.well.clone(),
            anchor: self.anchor,
            offset: self.offset + delta,
        }
    }

    pub fn raised(&self, dz: f64) -> Self {
        self.moved(Point::z(dz))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.well, self.anchor.as_str(), self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_compose() {
        let well = WellId::new("mag_plate", "A11");
        let loc = Location::top(&well)
            .moved(Point::new(-0.1, 0.5, -16.7))
            .raised(2.0);
        assert_eq!(loc.anchor, Anchor::Top);
        assert!((loc.offset.x + 0.1).abs() < 1e-9);
        assert!((loc.offset.y - 0.5).abs() < 1e-9);
        assert!((loc.offset.z + 14.7).abs() < 1e-9);
    }

    #[test]
    fn test_trash_well() {
        assert!(WellId::trash().is_trash());
        assert!(!WellId::new("mag_plate", "A1").is_trash());
        assert_eq!(WellId::new("tc_plate", "A5").to_string(), "tc_plate:A5");
    }

    #[test]
    fn test_well_id_parse() {
        let well: WellId = "temp_plate:A10".parse().unwrap();
        assert_eq!(well, WellId::new("temp_plate", "A10"));
        assert!("temp_plate".parse::<WellId>().is_err());
        assert!(":A1".parse::<WellId>().is_err());
    }

    #[test]
    fn test_location_json_defaults_offset() {
        let loc: Location = serde_json::from_str(
            r#"{"well":{"labware":"r15","well":"A3"},"anchor":"bottom"}"#,
        )
        .unwrap();
        assert_eq!(loc, Location::bottom(&WellId::new("r15", "A3")));
    }
}
