/// Schedule model and the pure evaluator that turns a schedule list into a
/// restriction level for a given wall-clock instant.

pub mod evaluator;
pub mod model;

pub use evaluator::{Evaluation, LocalInstant, ScheduleEvaluator};
pub use model::{DaySet, MinuteOfDay, Schedule};
