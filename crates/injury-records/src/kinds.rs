//! Enumerated column values.
//!
//! Each value serializes to the same lower-case text the tables store, so
//! the `Display` form can be used directly in equality filters.

use crate::RecordsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! column_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RecordsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| {
                        let allowed: Vec<_> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        RecordsError::Validation(format!(
                            "{} must be one of: {}.",
                            $label,
                            allowed.join(", ")
                        ))
                    })
            }
        }
    };
}

column_enum!(
    /// How bad the injury was.
    Severity, "Severity" {
        Minor => "minor",
        Moderate => "moderate",
        Serious => "serious",
        Critical => "critical",
    }
);

column_enum!(
    /// Investigation progress of an incident report.
    ReportStatus, "Status" {
        Open => "open",
        Investigating => "investigating",
        Closed => "closed",
    }
);

column_enum!(
    ActionStatus, "Status" {
        Pending => "pending",
        InProgress => "in_progress",
        Done => "done",
    }
);
