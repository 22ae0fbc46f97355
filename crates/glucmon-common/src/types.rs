use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anything persisted with an id and a point in time.
///
/// Activity merging and short-reference resolution only need these two
/// accessors, so they are written once against this trait.
pub trait Record {
    fn id(&self) -> &str;
    fn time(&self) -> DateTime<Utc>;
}

// ---- Readings ----

/// Rate-of-change indicator reported alongside a glucose value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    None,
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    NotComputable,
    RateOutOfRange,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::DoubleUp => "DoubleUp",
            Self::SingleUp => "SingleUp",
            Self::FortyFiveUp => "FortyFiveUp",
            Self::Flat => "Flat",
            Self::FortyFiveDown => "FortyFiveDown",
            Self::SingleDown => "SingleDown",
            Self::DoubleDown => "DoubleDown",
            Self::NotComputable => "NotComputable",
            Self::RateOutOfRange => "RateOutOfRange",
        }
    }

    /// Arrow glyph used on the live display.
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::DoubleUp => "⇈",
            Self::SingleUp => "↑",
            Self::FortyFiveUp => "↗",
            Self::Flat => "→",
            Self::FortyFiveDown => "↘",
            Self::SingleDown => "↓",
            Self::DoubleDown => "⇊",
            Self::None | Self::NotComputable | Self::RateOutOfRange => "?",
        }
    }
}

impl FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" | "" => Ok(Self::None),
            "DoubleUp" => Ok(Self::DoubleUp),
            "SingleUp" => Ok(Self::SingleUp),
            "FortyFiveUp" => Ok(Self::FortyFiveUp),
            "Flat" => Ok(Self::Flat),
            "FortyFiveDown" => Ok(Self::FortyFiveDown),
            "SingleDown" => Ok(Self::SingleDown),
            "DoubleDown" => Ok(Self::DoubleDown),
            "NotComputable" => Ok(Self::NotComputable),
            "RateOutOfRange" => Ok(Self::RateOutOfRange),
            other => Err(format!("unknown trend: {other}")),
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored glucose measurement (mmol/L).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub time: DateTime<Utc>,
    pub mmol: f64,
    pub trend: Trend,
}

/// A reading that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub time: DateTime<Utc>,
    pub mmol: f64,
    pub trend: Trend,
}

impl Record for Reading {
    fn id(&self) -> &str {
        &self.id
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

// ---- Doses ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseCategory {
    Rapid,
    Slow,
}

impl DoseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rapid => "rapid",
            Self::Slow => "slow",
        }
    }
}

impl FromStr for DoseCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rapid" | "fast" => Ok(Self::Rapid),
            "slow" => Ok(Self::Slow),
            other => Err(format!("unknown insulin type: {other}")),
        }
    }
}

impl fmt::Display for DoseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An insulin administration, in units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dose {
    pub id: String,
    pub time: DateTime<Utc>,
    pub category: DoseCategory,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDose {
    pub time: DateTime<Utc>,
    pub category: DoseCategory,
    pub amount: f64,
}

impl Record for Dose {
    fn id(&self) -> &str {
        &self.id
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

// ---- Intakes ----

/// A carbohydrate entry, in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    pub id: String,
    pub time: DateTime<Utc>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIntake {
    pub time: DateTime<Utc>,
    pub amount: f64,
}

impl Record for Intake {
    fn id(&self) -> &str {
        &self.id
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

// ---- Alerts ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertLabel {
    HighGlucose,
    LowGlucose,
    MissingSlowInsulin,
}

impl AlertLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighGlucose => "High Glucose",
            Self::LowGlucose => "Low Glucose",
            Self::MissingSlowInsulin => "Missing Slow Acting Insulin",
        }
    }
}

impl FromStr for AlertLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High Glucose" => Ok(Self::HighGlucose),
            "Low Glucose" => Ok(Self::LowGlucose),
            "Missing Slow Acting Insulin" => Ok(Self::MissingSlowInsulin),
            other => Err(format!("unknown alert label: {other}")),
        }
    }
}

impl fmt::Display for AlertLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marks that a notification for `label` went out at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub time: DateTime<Utc>,
    pub label: AlertLabel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub time: DateTime<Utc>,
    pub label: AlertLabel,
    pub reason: String,
}

impl Record for Alert {
    fn id(&self) -> &str {
        &self.id
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

// ---- Display ----

/// Which activity entries the live display lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    All,
    IntakeOnly,
    DoseOnly,
}

impl Visibility {
    pub fn shows_doses(&self) -> bool {
        matches!(self, Self::All | Self::DoseOnly)
    }

    pub fn shows_intakes(&self) -> bool {
        matches!(self, Self::All | Self::IntakeOnly)
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "0" => Ok(Self::All),
            "carb" | "carbs" | "1" => Ok(Self::IntakeOnly),
            "insulin" | "2" => Ok(Self::DoseOnly),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::IntakeOnly => f.write_str("carb"),
            Self::DoseOnly => f.write_str("insulin"),
        }
    }
}
