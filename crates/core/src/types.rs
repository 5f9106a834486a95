/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Position of a stage in the pipeline (1-based, see [`crate::stages`]).
pub type StageNumber = i16;

/// Money in integer minor units (tetri, cents).
pub type Cents = i64;
