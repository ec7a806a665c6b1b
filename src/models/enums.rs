use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(UploadKind {
    Incremental => "incremental",
    Manual => "manual",
});

str_enum!(PendingStatus {
    InFlight => "in_flight",
    Confirmed => "confirmed",
});

str_enum!(WorkoutEventType {
    Pause => "pause",
    Resume => "resume",
    Lap => "lap",
    Marker => "marker",
    MotionPaused => "motion_paused",
    MotionResumed => "motion_resumed",
    Segment => "segment",
    PauseOrResumeRequest => "pause_or_resume_request",
});

str_enum!(SwimStrokeStyle {
    Unknown => "unknown",
    Mixed => "mixed",
    Freestyle => "freestyle",
    Backstroke => "backstroke",
    Breaststroke => "breaststroke",
    Butterfly => "butterfly",
    Kickboard => "kickboard",
});

str_enum!(SwimLocation {
    Unknown => "unknown",
    Pool => "pool",
    OpenWater => "open_water",
});
