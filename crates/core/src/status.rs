//! Status enums shared by projects and content units.
//!
//! Wire representation is the lowercase snake_case name, matching the
//! backend's JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! define_wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Wire name of this value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $wire ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok($name::$variant), )+
                    other => Err(CoreError::Validation(format!(
                        "Invalid {} '{other}'. Must be one of: {}",
                        stringify!($name),
                        [$($wire),+].join(", ")
                    ))),
                }
            }
        }
    };
}

define_wire_enum! {
    /// Generation lifecycle of a content unit.
    ///
    /// `pending -> generating -> {completed, failed}`; terminal states may be
    /// re-triggered back into `generating`.
    UnitStatus {
        #[default]
        Pending => "pending",
        Generating => "generating",
        Completed => "completed",
        Failed => "failed",
    }
}

define_wire_enum! {
    /// Progress of a workflow phase.
    PhaseStatus {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

define_wire_enum! {
    /// How many declared dependencies must be completed before generation.
    DependencyType {
        #[default]
        All => "all",
        Any => "any",
    }
}

impl UnitStatus {
    /// Whether a generation may be (re-)started from this status.
    pub fn can_start_generation(self) -> bool {
        !matches!(self, UnitStatus::Generating)
    }

    /// `completed` or `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitStatus::Completed | UnitStatus::Failed)
    }
}
