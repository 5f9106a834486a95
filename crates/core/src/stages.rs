//! The fixed 18-stage project pipeline.
//!
//! Stage names are user-facing strings in the source locale and are stored
//! verbatim in `projects.current_stage` and `stage_history`, so they must
//! never be translated or reworded.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::StageNumber;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of the stage every project starts in.
pub const FIRST_STAGE: StageNumber = 1;

/// Number of the terminal "project completed" stage.
pub const FINAL_STAGE: StageNumber = 18;

/// Stages in which the project is waiting on payment (details sent,
/// awaiting transfer, transfer received).
pub const PAYMENT_STAGES: std::ops::RangeInclusive<StageNumber> = 14..=16;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Contiguous business grouping of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Sales,
    Development,
    Payment,
    Completion,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Sales,
        Phase::Development,
        Phase::Payment,
        Phase::Completion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Development => "development",
            Self::Payment => "payment",
            Self::Completion => "completion",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "sales" => Ok(Self::Sales),
            "development" => Ok(Self::Development),
            "payment" => Ok(Self::Payment),
            "completion" => Ok(Self::Completion),
            _ => Err(CoreError::Validation(format!(
                "Invalid phase: '{s}'. Must be one of: sales, development, payment, completion"
            ))),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Display metadata
// ---------------------------------------------------------------------------

/// Colour family used when rendering a stage badge or board column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Gray,
    Blue,
    Green,
    Yellow,
    Orange,
    Purple,
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One entry of the stage catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub number: StageNumber,
    pub name: &'static str,
    pub phase: Phase,
    /// Sub-group label shown above the stage on the board.
    pub phase_label: &'static str,
    pub tone: Tone,
}

impl Stage {
    /// The stage after this one, or `None` at the terminal stage.
    pub fn next(&self) -> Option<&'static Stage> {
        by_number(self.number + 1)
    }

    /// The stage before this one, or `None` at the initial stage.
    pub fn previous(&self) -> Option<&'static Stage> {
        by_number(self.number - 1)
    }

    pub fn is_final(&self) -> bool {
        self.number == FINAL_STAGE
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}. {}", self.number, self.name)
    }
}

const fn stage(
    number: StageNumber,
    name: &'static str,
    phase: Phase,
    phase_label: &'static str,
    tone: Tone,
) -> Stage {
    Stage {
        number,
        name,
        phase,
        phase_label,
        tone,
    }
}

/// The catalog, ordered by `number`. `STAGES[i].number == i + 1`.
pub static STAGES: [Stage; 18] = [
    // Initial contact (1-3)
    stage(1, "დასაწყები", Phase::Sales, "პირველადი", Tone::Gray),
    stage(2, "მოხდა პირველი კავშირი", Phase::Sales, "პირველადი", Tone::Gray),
    stage(3, "ჩავნიშნეთ შეხვედრა", Phase::Sales, "პირველადი", Tone::Gray),
    // Active communication (4-5)
    stage(
        4,
        "შევხვდით და ველოდებით ინფორმაციას",
        Phase::Sales,
        "აქტიური კომუნიკაცია",
        Tone::Blue,
    ),
    stage(5, "მივიღეთ ინფორმაცია", Phase::Sales, "აქტიური კომუნიკაცია", Tone::Blue),
    // Development (6-11)
    stage(6, "დავიწყეთ დეველოპემნტი", Phase::Development, "დეველოპმენტი", Tone::Green),
    stage(7, "დავიწყეთ ტესტირება", Phase::Development, "დეველოპმენტი", Tone::Green),
    stage(8, "გადავაგზავნეთ კლიენტთან", Phase::Development, "დეველოპმენტი", Tone::Green),
    stage(
        9,
        "ველოდებით კლიენტისგან უკუკავშირს",
        Phase::Development,
        "დეველოპმენტი",
        Tone::Green,
    ),
    stage(
        10,
        "დავიწყეთ კლიენტის ჩასწორებებზე მუშაობა",
        Phase::Development,
        "დეველოპმენტი",
        Tone::Green,
    ),
    stage(
        11,
        "გავუგზავნეთ კლიენტს საბოლოო ვერსია",
        Phase::Development,
        "დეველოპმენტი",
        Tone::Green,
    ),
    // Approval (12-13)
    stage(12, "ველოდებით კლიენტის დასტურს", Phase::Payment, "დასტური", Tone::Yellow),
    stage(13, "კლიენტმა დაგვიდასტურა", Phase::Payment, "დასტური", Tone::Yellow),
    // Payment (14-16)
    stage(
        14,
        "კლიენტს გავუგზავნეთ პროექტის გადახდის დეტალები",
        Phase::Payment,
        "გადახდა",
        Tone::Orange,
    ),
    stage(15, "კლიენტისგან ველოდებით ჩარიცხვას", Phase::Payment, "გადახდა", Tone::Orange),
    stage(16, "კლიენტმა ჩარიცხა", Phase::Payment, "გადახდა", Tone::Orange),
    // Final (17-18)
    stage(
        17,
        "ვამატებთ პორტფოლიო პროექტებში",
        Phase::Completion,
        "დასასრული",
        Tone::Purple,
    ),
    stage(18, "პროექტი დასრულებულია", Phase::Completion, "დასრულებული", Tone::Purple),
];

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Find a stage by its exact name.
///
/// An unknown name is a data-integrity signal; callers decide how to degrade
/// (typically by rendering the raw string).
pub fn by_name(name: &str) -> Option<&'static Stage> {
    STAGES.iter().find(|s| s.name == name)
}

/// Find a stage by its number (1..=18).
pub fn by_number(number: StageNumber) -> Option<&'static Stage> {
    if !(FIRST_STAGE..=FINAL_STAGE).contains(&number) {
        return None;
    }
    STAGES.get((number - 1) as usize)
}

/// The stage following the named one, `None` if terminal or unknown.
pub fn next_stage(current: &str) -> Option<&'static Stage> {
    by_name(current)?.next()
}

/// The stage preceding the named one, `None` if initial or unknown.
pub fn previous_stage(current: &str) -> Option<&'static Stage> {
    by_name(current)?.previous()
}

/// All stages of a phase in pipeline order.
pub fn stages_in_phase(phase: Phase) -> Vec<&'static Stage> {
    STAGES.iter().filter(|s| s.phase == phase).collect()
}

/// The stage every new project starts in.
pub fn initial_stage() -> &'static Stage {
    &STAGES[0]
}

pub fn is_payment_stage(number: StageNumber) -> bool {
    PAYMENT_STAGES.contains(&number)
}

pub fn is_completed(number: StageNumber) -> bool {
    number == FINAL_STAGE
}

/// Progress through a phase in percent.
///
/// 0 before the phase starts, 100 once it is passed, otherwise the share of
/// the phase's stages reached (the current stage counts as reached).
pub fn phase_progress(phase: Phase, current: StageNumber) -> f64 {
    let in_phase = stages_in_phase(phase);
    let (Some(first), Some(last)) = (in_phase.first(), in_phase.last()) else {
        return 0.0;
    };
    if current < first.number {
        return 0.0;
    }
    if current > last.number {
        return 100.0;
    }
    f64::from(current - first.number + 1) / in_phase.len() as f64 * 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
