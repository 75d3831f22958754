//! Route sequencer: orders the stops of one proposal
//!
//! Objective, compared lexicographically:
//! 1. lunch fit (a food stop arriving 12:00-14:00 beats one merely
//!    overlapping the window, which beats none),
//! 2. total travel minutes over the open path (no return leg).
//!
//! Small sets are searched exactly with depth-first branch-and-bound;
//! larger sets, or searches that run out of time, fall back to nearest
//! neighbour + 2-opt and are reported as degraded.

use std::time::{Duration, Instant};

use chrono::{NaiveTime, Timelike};
use tracing::{debug, warn};

use crate::defaults::{
    lunch_window_end, lunch_window_start, DEFAULT_TRAVEL_MINUTES, EXACT_SEQUENCING_MAX_STOPS,
    SEQUENCER_TIME_BUDGET_MS, UNKNOWN_TRAVEL_PENALTY_MINUTES,
};
use crate::services::travel_matrix::TravelTimes;
use crate::types::{LunchFit, SequencingStrategy, Stop, StopId};

/// Nodes expanded between deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 512;

/// Sequencer configuration
#[derive(Debug, Clone)]
pub struct SequencerPolicy {
    /// Exact search only up to this many stops
    pub exact_max_stops: usize,
    /// Wall-clock budget for the exact search
    pub time_budget: Duration,
    /// Cost of a leg the provider could not resolve
    pub unknown_travel_penalty_minutes: u32,
    /// 2-opt passes per heuristic start
    pub two_opt_max_iterations: usize,
}

impl Default for SequencerPolicy {
    fn default() -> Self {
        Self {
            exact_max_stops: EXACT_SEQUENCING_MAX_STOPS,
            time_budget: Duration::from_millis(SEQUENCER_TIME_BUDGET_MS),
            unknown_travel_penalty_minutes: UNKNOWN_TRAVEL_PENALTY_MINUTES,
            two_opt_max_iterations: 100,
        }
    }
}

impl SequencerPolicy {
    /// Heuristic only, for very large proposals or latency-critical callers
    pub fn heuristic_only() -> Self {
        Self {
            exact_max_stops: 0,
            ..Default::default()
        }
    }
}

/// Result of sequencing
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceOutcome {
    pub order: Vec<StopId>,
    pub strategy: SequencingStrategy,
    /// The exact search was skipped or cut short
    pub degraded: bool,
    pub lunch: LunchFit,
    /// Travel along `order` with unknown legs counted at the default duration
    pub total_travel_minutes: u32,
}

/// Order `stops` (given in their pre-edit order).
///
/// `fixed_first` pins that stop at position 0. Ties keep the pre-edit
/// relative order. Always returns a permutation of the input ids.
pub fn sequence(
    stops: &[Stop],
    travel: &dyn TravelTimes,
    fixed_first: Option<StopId>,
    start: NaiveTime,
    policy: &SequencerPolicy,
) -> SequenceOutcome {
    RouteSequencer::new(stops, travel, fixed_first, start, policy).solve()
}

/// Lunch fit and travel of `ordered` exactly as given, without searching
pub fn evaluate_order(ordered: &[Stop], travel: &dyn TravelTimes, start: NaiveTime) -> (LunchFit, u32) {
    let policy = SequencerPolicy::default();
    let sequencer = RouteSequencer::new(ordered, travel, None, start, &policy);
    let outcome = sequencer.outcome((0..ordered.len()).collect(), SequencingStrategy::Exact, false);
    (outcome.lunch, outcome.total_travel_minutes)
}

/// Lexicographic objective: (lunch rank, penalised travel)
type Cost = (u8, u64);

struct RouteSequencer<'a> {
    stops: &'a [Stop],
    policy: &'a SequencerPolicy,
    /// Objective travel; unknown legs carry the penalty
    cost: Vec<Vec<u64>>,
    /// Travel used for arrival simulation; unknown legs use the default
    sim: Vec<Vec<u32>>,
    /// Cheapest way into each node
    min_incoming: Vec<u64>,
    durations: Vec<u32>,
    food: Vec<bool>,
    has_food: bool,
    fixed_first: Option<usize>,
    start_minute: u32,
    lunch_start: u32,
    lunch_end: u32,
}

impl<'a> RouteSequencer<'a> {
    fn new(
        stops: &'a [Stop],
        travel: &dyn TravelTimes,
        fixed_first: Option<StopId>,
        start: NaiveTime,
        policy: &'a SequencerPolicy,
    ) -> Self {
        let n = stops.len();
        let mut cost = vec![vec![0u64; n]; n];
        let mut sim = vec![vec![0u32; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                match travel.minutes(&stops[i], &stops[j]) {
                    Some(minutes) => {
                        cost[i][j] = minutes as u64;
                        sim[i][j] = minutes;
                    }
                    None => {
                        cost[i][j] = policy.unknown_travel_penalty_minutes as u64;
                        sim[i][j] = DEFAULT_TRAVEL_MINUTES;
                    }
                }
            }
        }

        let min_incoming = (0..n)
            .map(|j| (0..n).filter(|&i| i != j).map(|i| cost[i][j]).min().unwrap_or(0))
            .collect();

        let food: Vec<bool> = stops.iter().map(Stop::is_food).collect();
        let has_food = food.iter().any(|&f| f);

        Self {
            stops,
            policy,
            cost,
            sim,
            min_incoming,
            durations: stops.iter().map(|s| s.duration_minutes).collect(),
            food,
            has_food,
            fixed_first: fixed_first.and_then(|id| stops.iter().position(|s| s.id == id)),
            start_minute: minute_of_day(start),
            lunch_start: minute_of_day(lunch_window_start()),
            lunch_end: minute_of_day(lunch_window_end()),
        }
    }

    fn solve(&self) -> SequenceOutcome {
        let n = self.stops.len();
        if n <= 1 {
            return self.outcome((0..n).collect(), SequencingStrategy::Exact, false);
        }

        if n <= self.policy.exact_max_stops {
            let started = Instant::now();
            let deadline = started + self.policy.time_budget;
            let mut search = ExactSearch::new(self, deadline);
            search.run();

            if !search.timed_out {
                if let Some((order, _)) = search.best {
                    debug!(
                        "Exact sequencing of {} stops: {} nodes in {:?}",
                        n,
                        search.nodes,
                        started.elapsed()
                    );
                    return self.outcome(order, SequencingStrategy::Exact, false);
                }
            }

            warn!(
                "Exact sequencing of {} stops exceeded {:?} after {} nodes, using heuristic",
                n, self.policy.time_budget, search.nodes
            );
            let (heuristic, heuristic_cost) = self.heuristic();
            return match search.best {
                Some((order, cost)) if cost <= heuristic_cost => {
                    self.outcome(order, SequencingStrategy::Exact, true)
                }
                _ => self.outcome(heuristic, SequencingStrategy::Heuristic, true),
            };
        }

        debug!(
            "{} stops above exact threshold {}, using heuristic",
            n, self.policy.exact_max_stops
        );
        let (order, _) = self.heuristic();
        self.outcome(order, SequencingStrategy::Heuristic, true)
    }

    fn outcome(&self, order: Vec<usize>, strategy: SequencingStrategy, degraded: bool) -> SequenceOutcome {
        let total_travel_minutes = order.windows(2).map(|w| self.sim[w[0]][w[1]]).sum();
        SequenceOutcome {
            lunch: self.lunch_fit(&order),
            order: order.iter().map(|&i| self.stops[i].id).collect(),
            strategy,
            degraded,
            total_travel_minutes,
        }
    }

    fn lunch_at(&self, node: usize, arrival: u32) -> LunchFit {
        let departure = arrival + self.durations[node];
        if arrival >= self.lunch_start && arrival < self.lunch_end {
            LunchFit::Inside
        } else if arrival < self.lunch_end && departure > self.lunch_start {
            LunchFit::Overlapping
        } else {
            LunchFit::Missed
        }
    }

    fn lunch_fit(&self, order: &[usize]) -> LunchFit {
        if !self.has_food {
            return LunchFit::NoFoodStop;
        }
        let mut best = LunchFit::Missed;
        let mut clock = self.start_minute;
        for (position, &node) in order.iter().enumerate() {
            if position > 0 {
                clock += self.sim[order[position - 1]][node];
            }
            if self.food[node] {
                let fit = self.lunch_at(node, clock);
                if fit.rank() < best.rank() {
                    best = fit;
                }
            }
            clock += self.durations[node];
        }
        best
    }

    fn evaluate(&self, order: &[usize]) -> Cost {
        let travel = order.windows(2).map(|w| self.cost[w[0]][w[1]]).sum();
        (self.lunch_fit(order).rank(), travel)
    }

    /// Nearest neighbour from every permitted start, each improved by 2-opt.
    fn heuristic(&self) -> (Vec<usize>, Cost) {
        let n = self.stops.len();
        let starts: Vec<usize> = match self.fixed_first {
            Some(anchor) => vec![anchor],
            None => (0..n).collect(),
        };

        let mut best: Option<(Vec<usize>, Cost)> = None;
        for first in starts {
            let order = self.two_opt(self.nearest_neighbor(first));
            let cost = self.evaluate(&order);
            let better = match &best {
                None => true,
                Some((best_order, best_cost)) => (cost, &order) < (*best_cost, best_order),
            };
            if better {
                best = Some((order, cost));
            }
        }

        best.unwrap_or_else(|| {
            let order: Vec<usize> = (0..n).collect();
            let cost = self.evaluate(&order);
            (order, cost)
        })
    }

    fn nearest_neighbor(&self, first: usize) -> Vec<usize> {
        let n = self.stops.len();
        let mut order = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        order.push(first);
        visited[first] = true;

        while order.len() < n {
            let current = order[order.len() - 1];
            // Strict `<` keeps the lowest pre-edit index on ties
            let mut next: Option<usize> = None;
            for candidate in (0..n).filter(|&j| !visited[j]) {
                if next.map_or(true, |best| self.cost[current][candidate] < self.cost[current][best]) {
                    next = Some(candidate);
                }
            }
            let Some(next) = next else { break };
            visited[next] = true;
            order.push(next);
        }

        order
    }

    /// 2-opt local search on the full objective
    fn two_opt(&self, mut order: Vec<usize>) -> Vec<usize> {
        let n = order.len();
        if n < 3 {
            return order;
        }
        let first_movable = usize::from(self.fixed_first.is_some());
        let mut current = self.evaluate(&order);
        let mut improved = true;
        let mut iterations = 0;

        while improved && iterations < self.policy.two_opt_max_iterations {
            improved = false;
            iterations += 1;

            for i in first_movable..n - 1 {
                for j in i + 1..n {
                    order[i..=j].reverse();
                    let candidate = self.evaluate(&order);
                    if candidate < current {
                        current = candidate;
                        improved = true;
                    } else {
                        order[i..=j].reverse();
                    }
                }
            }
        }

        order
    }
}

/// Depth-first branch-and-bound over permutations in pre-edit index order.
///
/// The incumbent is only replaced on strict improvement, so among equal-cost
/// orders the lexicographically smallest (by pre-edit index) wins.
struct ExactSearch<'s, 'a> {
    seq: &'s RouteSequencer<'a>,
    deadline: Instant,
    path: Vec<usize>,
    visited: Vec<bool>,
    best: Option<(Vec<usize>, Cost)>,
    nodes: u64,
    timed_out: bool,
}

impl<'s, 'a> ExactSearch<'s, 'a> {
    fn new(seq: &'s RouteSequencer<'a>, deadline: Instant) -> Self {
        let n = seq.stops.len();
        Self {
            seq,
            deadline,
            path: Vec::with_capacity(n),
            visited: vec![false; n],
            best: None,
            nodes: 0,
            timed_out: false,
        }
    }

    fn run(&mut self) {
        let seq = self.seq;
        let remaining_food = seq.food.iter().filter(|&&f| f).count();
        let remaining_bound: u64 = seq.min_incoming.iter().sum();
        let starts: Vec<usize> = match seq.fixed_first {
            Some(anchor) => vec![anchor],
            None => (0..seq.stops.len()).collect(),
        };

        for first in starts {
            if self.timed_out {
                return;
            }
            // The first stop is entered for free
            let bound = remaining_bound - seq.min_incoming[first];
            self.visit(first, seq.start_minute, 0, bound, LunchFit::Missed, remaining_food);
        }
    }

    /// Extend the path with `node`, arriving at `arrival`.
    ///
    /// `travel` is the penalised travel so far, `bound` the sum of cheapest
    /// incoming legs of nodes still unvisited after this one.
    fn visit(
        &mut self,
        node: usize,
        arrival: u32,
        travel: u64,
        bound: u64,
        lunch: LunchFit,
        remaining_food: usize,
    ) {
        let seq = self.seq;
        self.nodes += 1;
        if (self.nodes - 1) % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        if self.timed_out {
            return;
        }

        let (lunch, remaining_food) = if seq.food[node] {
            let fit = seq.lunch_at(node, arrival);
            let best = if fit.rank() < lunch.rank() { fit } else { lunch };
            (best, remaining_food - 1)
        } else {
            (lunch, remaining_food)
        };

        // Best rank still reachable from here
        let rank_bound = if !seq.has_food || remaining_food > 0 { 0 } else { lunch.rank() };
        if let Some((_, best_cost)) = &self.best {
            if (rank_bound, travel + bound) >= *best_cost {
                return;
            }
        }

        self.path.push(node);
        self.visited[node] = true;

        if self.path.len() == seq.stops.len() {
            let rank = if seq.has_food { lunch.rank() } else { 0 };
            let cost = (rank, travel);
            if self.best.as_ref().map_or(true, |(_, best)| cost < *best) {
                self.best = Some((self.path.clone(), cost));
            }
        } else {
            let departure = arrival + seq.durations[node];
            for next in 0..seq.stops.len() {
                if self.visited[next] {
                    continue;
                }
                self.visit(
                    next,
                    departure + seq.sim[node][next],
                    travel + seq.cost[node][next],
                    bound - seq.min_incoming[next],
                    lunch,
                    remaining_food,
                );
                if self.timed_out {
                    break;
                }
            }
        }

        self.visited[node] = false;
        self.path.pop();
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}
