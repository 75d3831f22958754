use chrono::NaiveTime;

/// Travel minutes substituted when the provider cannot answer.
pub const DEFAULT_TRAVEL_MINUTES: u32 = 15;

pub const DEFAULT_STOP_DURATION_MINUTES: u32 = 60;

pub const DEFAULT_EVENT_DURATION_HOURS: f64 = 6.0;

pub const MAX_GROUP_SIZE: i64 = 10_000;

/// One week
pub const MAX_EVENT_DURATION_HOURS: f64 = 168.0;

/// Start times are quantized to this step.
pub const START_TIME_QUANTUM_MINUTES: u32 = 15;

/// Groups strictly larger than this get the group discount.
pub const GROUP_DISCOUNT_MIN_EXCLUSIVE: u32 = 10;

/// 5% in basis points
pub const GROUP_DISCOUNT_BPS: u32 = 500;

pub const EXACT_SEQUENCING_MAX_STOPS: usize = 10;

pub const SEQUENCER_TIME_BUDGET_MS: u64 = 150;

pub const UNKNOWN_TRAVEL_PENALTY_MINUTES: u32 = 240;

pub const TRAVEL_TIMEOUT_MS: u64 = 2000;

pub fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).expect("valid static default start")
}

pub fn lunch_window_start() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).expect("valid static lunch start")
}

pub fn lunch_window_end() -> NaiveTime {
    NaiveTime::from_hms_opt(14, 0, 0).expect("valid static lunch end")
}
