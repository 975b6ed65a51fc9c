use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatingType {
    Standing,
    Seated,
    Mixed,
}

impl SeatingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatingType::Standing => "STANDING",
            SeatingType::Seated => "SEATED",
            SeatingType::Mixed => "MIXED",
        }
    }
}

impl fmt::Display for SeatingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDING" => Ok(SeatingType::Standing),
            "SEATED" => Ok(SeatingType::Seated),
            "MIXED" => Ok(SeatingType::Mixed),
            other => Err(format!("unknown seating type '{}'", other)),
        }
    }
}

/// A physical space inside a structure (room, stage, hall).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Area {
    pub id: Uuid,
    pub structure_id: Uuid,
    pub name: String,
}

/// Reusable capacity definition for an area. Owned by venue management;
/// the engine only reads it when allocating event zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceZoneTemplate {
    pub id: Uuid,
    pub area_id: Uuid,
    pub name: String,
    pub max_capacity: u32,
    pub seating_type: SeatingType,
    pub active: bool,
}

/// A template resolved together with the area that hosts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub template: AudienceZoneTemplate,
    pub area: Area,
}

impl TemplateRef {
    pub fn structure_id(&self) -> Uuid {
        self.area.structure_id
    }
}
