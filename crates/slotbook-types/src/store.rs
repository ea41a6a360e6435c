//! Store and staff directory records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::id::{StaffId, StoreId};

/// Staff role counted toward slot capacity.
pub const TECHNICIAN_ROLE: &str = "technician";

/// Operating status of a store. Only operating stores get daily slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Operating,
    Closed,
    Shutdown,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Operating => write!(f, "operating"),
            StoreStatus::Closed => write!(f, "closed"),
            StoreStatus::Shutdown => write!(f, "shutdown"),
        }
    }
}

impl FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "operating" => Ok(StoreStatus::Operating),
            "closed" => Ok(StoreStatus::Closed),
            "shutdown" => Ok(StoreStatus::Shutdown),
            other => Err(format!("invalid store status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub status: StoreStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shift status of a staff member. Only `Working` technicians count toward capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Working,
    Rest,
    Offline,
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkStatus::Working => write!(f, "working"),
            WorkStatus::Rest => write!(f, "rest"),
            WorkStatus::Offline => write!(f, "offline"),
        }
    }
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "working" => Ok(WorkStatus::Working),
            "rest" => Ok(WorkStatus::Rest),
            "offline" => Ok(WorkStatus::Offline),
            other => Err(format!("invalid work status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub store_id: StoreId,
    pub display_name: String,
    /// Always [`TECHNICIAN_ROLE`] for now.
    pub role: String,
    pub work_status: WorkStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_status_parse() {
        assert_eq!("Operating".parse::<StoreStatus>().unwrap(), StoreStatus::Operating);
        assert!("open".parse::<StoreStatus>().is_err());
    }

    #[test]
    fn test_work_status_display_roundtrip() {
        for status in [WorkStatus::Working, WorkStatus::Rest, WorkStatus::Offline] {
            assert_eq!(status.to_string().parse::<WorkStatus>().unwrap(), status);
        }
    }
}
