//! Timeline computation for an ordered itinerary.
//!
//! Walks the stops in order and computes arrival/departure times. It never
//! reorders; that is the sequencer's job. Travel that cannot be resolved
//! falls back to a fixed default and the affected stop is flagged.

use chrono::{NaiveTime, Timelike};

use crate::defaults::{lunch_window_end, lunch_window_start, DEFAULT_TRAVEL_MINUTES};
use crate::services::travel_matrix::TravelTimes;
use crate::types::{Conflict, Stop, TimedStop, Timeline};

const MINUTES_PER_DAY: u32 = 24 * 60;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn minute_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

/// Wall-clock time for a minute count that may run past midnight
fn clock(minute: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt((minute % MINUTES_PER_DAY) * 60, 0)
        .unwrap_or(NaiveTime::MIN)
}

/// Whether `[arrival, departure]` touches the lunch window. A zero-length
/// stop counts when it falls inside the window.
fn overlaps_lunch(arrival: u32, departure: u32, lunch: (u32, u32)) -> bool {
    let (start, end) = lunch;
    if arrival == departure {
        return arrival >= start && arrival < end;
    }
    arrival < end && departure > start
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Build the timeline for `ordered` starting at `event_start`.
///
/// Stop 0 arrives at `event_start`; stop i arrives at departure(i-1) plus
/// travel(i-1 -> i). Conflicts are advisory. Pure and idempotent.
pub fn build(
    ordered: &[Stop],
    event_start: NaiveTime,
    travel: &dyn TravelTimes,
    max_minutes: u32,
) -> Timeline {
    let start_minute = minute_of_day(event_start);
    let mut stops: Vec<TimedStop> = Vec::with_capacity(ordered.len());
    let mut cursor = start_minute;
    let mut total_travel = 0u32;
    let mut total_stop = 0u32;

    for (i, stop) in ordered.iter().enumerate() {
        let mut estimated = false;
        if i > 0 {
            let leg = match travel.minutes(&ordered[i - 1], stop) {
                Some(minutes) => minutes,
                None => {
                    estimated = true;
                    DEFAULT_TRAVEL_MINUTES
                }
            };
            if let Some(previous) = stops.last_mut() {
                previous.travel_to_next_minutes = leg;
            }
            cursor += leg;
            total_travel += leg;
        }

        let arrival = cursor;
        let departure = arrival + stop.duration_minutes;
        total_stop += stop.duration_minutes;

        stops.push(TimedStop {
            stop: stop.clone(),
            arrival: clock(arrival),
            departure: clock(departure),
            arrival_minute: arrival,
            departure_minute: departure,
            travel_to_next_minutes: 0,
            estimated,
        });
        cursor = departure;
    }

    let end_minute = cursor;
    let conflicts = detect_conflicts(&stops, start_minute, end_minute, max_minutes);

    Timeline {
        stops,
        conflicts,
        start: event_start,
        end: clock(end_minute),
        total_minutes: end_minute - start_minute,
        total_travel_minutes: total_travel,
        total_stop_minutes: total_stop,
    }
}

fn detect_conflicts(stops: &[TimedStop], start: u32, end: u32, max_minutes: u32) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    if stops.is_empty() {
        return conflicts;
    }

    let lunch = (minute_of_day(lunch_window_start()), minute_of_day(lunch_window_end()));
    let spans_lunch = start < lunch.1 && end > lunch.0;
    let mut food = stops.iter().filter(|s| s.stop.is_food()).peekable();
    let has_food = food.peek().is_some();
    let meal_in_window = food.any(|s| overlaps_lunch(s.arrival_minute, s.departure_minute, lunch));
    if (spans_lunch || has_food) && !meal_in_window {
        conflicts.push(Conflict::NoMealInWindow);
    }

    let total_minutes = end - start;
    if total_minutes > max_minutes {
        conflicts.push(Conflict::ExceedsEventDuration {
            total_minutes,
            max_minutes,
        });
    }

    if end >= MINUTES_PER_DAY {
        conflicts.push(Conflict::PastMidnight { end_minute: end });
    }

    conflicts
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityType, SubGroup};
    use uuid::Uuid;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn stop(n: u128, activity_type: ActivityType, duration_minutes: u32) -> Stop {
        Stop {
            id: Uuid::from_u128(n),
            name: format!("Stop {}", n),
            location: None,
            coordinates: None,
            duration_minutes,
            notes: String::new(),
            activity_type,
            sub_group: SubGroup::All,
        }
    }

    fn twenty_minutes(_: &Stop, _: &Stop) -> Option<u32> {
        Some(20)
    }

    fn unknown(_: &Stop, _: &Stop) -> Option<u32> {
        None
    }

    const SIX_HOURS: u32 = 360;

    // -----------------------------------------------------------------------
    // Basic walk
    // -----------------------------------------------------------------------

    #[test]
    fn empty_itinerary_has_no_conflicts() {
        let timeline = build(&[], hm(9, 30), &twenty_minutes, SIX_HOURS);

        assert!(timeline.stops.is_empty());
        assert!(timeline.conflicts.is_empty());
        assert_eq!(timeline.end, hm(9, 30));
        assert_eq!(timeline.total_minutes, 0);
    }

    #[test]
    fn arrivals_chain_departure_plus_travel() {
        let stops = [
            stop(1, ActivityType::Adventure, 60),
            stop(2, ActivityType::Cultural, 45),
            stop(3, ActivityType::Adventure, 30),
        ];
        let timeline = build(&stops, hm(9, 30), &twenty_minutes, SIX_HOURS);

        assert_eq!(timeline.stops[0].arrival, hm(9, 30));
        assert_eq!(timeline.stops[0].departure, hm(10, 30));
        assert_eq!(timeline.stops[1].arrival, hm(10, 50));
        assert_eq!(timeline.stops[2].arrival, hm(11, 55));
        assert_eq!(timeline.end, hm(12, 25));
        assert_eq!(timeline.total_travel_minutes, 40);
        assert_eq!(timeline.total_stop_minutes, 135);
        assert_eq!(timeline.total_minutes, 175);
    }

    #[test]
    fn last_stop_has_zero_travel_to_next() {
        let stops = [stop(1, ActivityType::Adventure, 60), stop(2, ActivityType::Adventure, 60)];
        let timeline = build(&stops, hm(9, 0), &twenty_minutes, SIX_HOURS);

        assert_eq!(timeline.stops[0].travel_to_next_minutes, 20);
        assert_eq!(timeline.stops[1].travel_to_next_minutes, 0);
    }

    #[test]
    fn unknown_travel_uses_default_and_flags_stop() {
        let stops = [stop(1, ActivityType::Adventure, 60), stop(2, ActivityType::Adventure, 60)];
        let timeline = build(&stops, hm(9, 0), &unknown, SIX_HOURS);

        assert!(!timeline.stops[0].estimated);
        assert!(timeline.stops[1].estimated);
        assert_eq!(timeline.stops[1].arrival, hm(10, 15));
        assert_eq!(timeline.estimated_stops(), vec![Uuid::from_u128(2)]);
    }

    #[test]
    fn build_is_idempotent() {
        let stops = [
            stop(1, ActivityType::Adventure, 90),
            stop(2, ActivityType::Food, 60),
            stop(3, ActivityType::Cultural, 45),
        ];
        let first = build(&stops, hm(10, 0), &twenty_minutes, SIX_HOURS);
        let second = build(&stops, hm(10, 0), &twenty_minutes, SIX_HOURS);
        assert_eq!(first, second);
    }

    #[test]
    fn longer_duration_never_moves_later_stops_earlier() {
        let mut stops = vec![
            stop(1, ActivityType::Adventure, 60),
            stop(2, ActivityType::Cultural, 60),
            stop(3, ActivityType::Adventure, 60),
        ];
        let before = build(&stops, hm(9, 30), &twenty_minutes, SIX_HOURS);
        stops[0].duration_minutes = 95;
        let after = build(&stops, hm(9, 30), &twenty_minutes, SIX_HOURS);

        assert_eq!(after.stops[0].arrival, before.stops[0].arrival);
        for i in 1..stops.len() {
            assert!(after.stops[i].arrival_minute >= before.stops[i].arrival_minute);
            assert_eq!(after.stops[i].arrival_minute - before.stops[i].arrival_minute, 35);
        }
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    #[test]
    fn food_stop_in_window_has_no_meal_conflict() {
        let stops = [
            stop(1, ActivityType::Adventure, 150),
            stop(2, ActivityType::Food, 60),
            stop(3, ActivityType::Cultural, 90),
        ];
        let timeline = build(&stops, hm(9, 30), &twenty_minutes, SIX_HOURS);

        assert_eq!(timeline.stops[1].arrival, hm(12, 20));
        assert!(!timeline.has_conflict(&Conflict::NoMealInWindow));
    }

    #[test]
    fn removing_food_stop_yields_no_meal_conflict() {
        let stops = [stop(1, ActivityType::Adventure, 150), stop(3, ActivityType::Cultural, 90)];
        let timeline = build(&stops, hm(9, 30), &twenty_minutes, SIX_HOURS);

        assert!(timeline.has_conflict(&Conflict::NoMealInWindow));
    }

    #[test]
    fn morning_only_tour_needs_no_meal() {
        let stops = [stop(1, ActivityType::Adventure, 60), stop(2, ActivityType::Cultural, 60)];
        let timeline = build(&stops, hm(9, 0), &twenty_minutes, SIX_HOURS);

        assert!(timeline.conflicts.is_empty());
    }

    #[test]
    fn breakfast_outside_window_is_flagged() {
        let stops = [stop(1, ActivityType::Food, 45), stop(2, ActivityType::Adventure, 60)];
        let timeline = build(&stops, hm(8, 0), &twenty_minutes, SIX_HOURS);

        assert!(timeline.has_conflict(&Conflict::NoMealInWindow));
    }

    #[test]
    fn exceeding_event_duration_is_flagged() {
        let stops = [stop(1, ActivityType::Adventure, 120), stop(2, ActivityType::Adventure, 120)];
        let timeline = build(&stops, hm(9, 0), &twenty_minutes, 180);

        assert!(timeline.has_conflict(&Conflict::ExceedsEventDuration {
            total_minutes: 260,
            max_minutes: 180,
        }));
    }

    #[test]
    fn schedule_past_midnight_wraps_clock_and_is_flagged() {
        let stops = [stop(1, ActivityType::Adventure, 120), stop(2, ActivityType::Adventure, 60)];
        let timeline = build(&stops, hm(22, 30), &twenty_minutes, SIX_HOURS);

        assert_eq!(timeline.stops[1].arrival, hm(0, 50));
        assert_eq!(timeline.stops[1].arrival_minute, 24 * 60 + 50);
        assert!(timeline.has_conflict(&Conflict::PastMidnight { end_minute: 24 * 60 + 110 }));
    }
}
