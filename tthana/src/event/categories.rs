use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Analysis category of an event, driven by lepton mode, jet multiplicity
/// and the hadronic W mass window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    NoCat,
    Cat1,
    Cat2,
    Cat3,
    Cat6,
}

impl EventCategory {
    /// Returns the `EventCategory` corresponding to the given numeric code.
    pub fn new(code: i32) -> EventCategory {
        match code {
            1 => EventCategory::Cat1,
            2 => EventCategory::Cat2,
            3 => EventCategory::Cat3,
            6 => EventCategory::Cat6,
            _ => EventCategory::NoCat,
        }
    }

    /// Returns the numeric code written to output records.
    pub fn numeric(&self) -> i32 {
        match self {
            EventCategory::NoCat => -1,
            EventCategory::Cat1 => 1,
            EventCategory::Cat2 => 2,
            EventCategory::Cat3 => 3,
            EventCategory::Cat6 => 6,
        }
    }
}

impl Display for EventCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EventCategory::NoCat => write!(f, "NOCAT"),
            EventCategory::Cat1 => write!(f, "cat1"),
            EventCategory::Cat2 => write!(f, "cat2"),
            EventCategory::Cat3 => write!(f, "cat3"),
            EventCategory::Cat6 => write!(f, "cat6"),
        }
    }
}

/// B-tagging category of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BtagCategory {
    NoCat,
    Low,
    High,
}

impl BtagCategory {
    pub fn new(code: i32) -> BtagCategory {
        match code {
            0 => BtagCategory::Low,
            1 => BtagCategory::High,
            _ => BtagCategory::NoCat,
        }
    }

    pub fn numeric(&self) -> i32 {
        match self {
            BtagCategory::NoCat => -1,
            BtagCategory::Low => 0,
            BtagCategory::High => 1,
        }
    }
}

impl Display for BtagCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BtagCategory::NoCat => write!(f, "NOCAT"),
            BtagCategory::Low => write!(f, "L"),
            BtagCategory::High => write!(f, "H"),
        }
    }
}

/// Category decision from the selected event content.
///
/// Single-lepton events need six jets and a hadronic W mass in [60, 100) or
/// more than six with a tighter [72, 94) window for the boosted category,
/// fall back to the inclusive six-jet and the five-jet categories
/// otherwise. Di-lepton events only split on jet multiplicity.
pub fn derive_event_category(is_sl: bool, is_dl: bool, num_jets: usize, w_mass: f64) -> EventCategory {
    if is_sl {
        if num_jets == 6 && (60.0..100.0).contains(&w_mass) {
            EventCategory::Cat1
        } else if num_jets > 6 && (72.0..94.0).contains(&w_mass) {
            EventCategory::Cat1
        } else if num_jets >= 6 {
            EventCategory::Cat2
        } else if num_jets == 5 {
            EventCategory::Cat3
        } else {
            EventCategory::NoCat
        }
    } else if is_dl && num_jets >= 4 {
        EventCategory::Cat6
    } else {
        EventCategory::NoCat
    }
}
