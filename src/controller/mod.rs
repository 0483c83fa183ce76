//! A hill-climbing search over the local:remote weighted-interleave ratio,
//! driven by a bounded history of bandwidth samples.

/// Local ratio moves by at most this much per adjustment.
pub const MAX_STEP: i64 = 10;
/// Steps smaller than this collapse to zero (dead-band).
pub const MIN_STEP: i64 = 2;
/// Percentile of the (second-half) sample window used as `cur_bw`.
pub const BW_PERCENTILE: usize = 80;
/// `|bw_change / interleave_change|` below this keeps accelerating instead
/// of attenuating, in the saturated "good step" branch.
pub const THROTTLE_THRESHOLD: i64 = 80;
/// Consecutive good steps before the step size doubles.
const STREAK_LIMIT: u32 = 3;

/// Persisted controller memory. Owned by the control task; passed by
/// `&mut` into [`adjust`] once per adjustment window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    pub ratio: u8,
    pub last_bw: i64,
    pub last_step: i64,
    pub correct_count: u32,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            ratio: 100,
            last_bw: 0,
            // Starts past the dead band so the first unsaturated sample
            // always takes the backoff branch instead of the kick branch.
            last_step: -2 * MAX_STEP,
            correct_count: 0,
        }
    }
}

/// A bounded window of recent sum-samples, cleared at each adjustment.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    capacity: usize,
    samples: Vec<i64>,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Appends a sample. Once `is_full`, further pushes are ignored until
    /// [`Self::clear`] -- the caller is expected to adjust and clear as soon
    /// as the history fills.
    pub fn push(&mut self, sample: i64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        }
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.samples
    }
}

/// One adjustment's reported figures, for the controller CLI's per-line
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub ratio: u8,
    pub bw_change: i64,
    pub interleave_change: i64,
    pub cur_bw: i64,
}

/// Discards the earliest half of `history` (the first `size/2` entries by
/// a *1-based* count are dropped, which for even sizes keeps one more than
/// a clean half split), sorts the remainder, and selects the
/// `percentile`-th value. A zero result is sanitised to 1 to avoid a later
/// division by zero.
fn percentile_bw(history: &[i64], percentile: usize) -> i64 {
    let size = history.len();
    let mut kept: Vec<i64> = history
        .iter()
        .copied()
        .enumerate()
        .filter(|(idx, _)| idx + 1 >= size / 2)
        .map(|(_, v)| v)
        .collect();
    kept.sort_unstable();
    let index = (kept.len() * percentile / 100).saturating_sub(1);
    let raw = kept[index];
    if raw == 0 { 1 } else { raw }
}

/// A step is "good" when the bandwidth drop is smaller than the
/// interleave-ratio change that caused it -- i.e. the ratio move is paying
/// for itself. See DESIGN.md for the choice between this and the other
/// sibling predicates this controller could have used.
fn good_step(bw_change: i64, interleave_change: i64) -> bool {
    bw_change < interleave_change
}

/// `ratio * (bw_change/100) / 100`. Dividing by 100 twice rather than by
/// 10000 in one shot changes the truncation for negative inputs, so the
/// order matters.
fn proportional_step(ratio: u8, bw_change: i64) -> i64 {
    (ratio as i64) * (bw_change / 100) / 100
}

/// Runs one adjustment: consumes `history` (already full), mutates `state`
/// in place, and returns the figures to report. Does not touch the Weight
/// Sink -- see [`weights_for`] for the commit-time (255, 1) special case.
pub fn adjust(state: &mut ControllerState, history: &[i64], bw_cutoff: i64) -> Adjustment {
    let mut cur_bw = percentile_bw(history, BW_PERCENTILE);
    if cur_bw == 0 {
        cur_bw = 1;
    }
    if state.last_bw == 0 {
        state.last_bw = cur_bw;
    }

    let bw_change = 10000 * (state.last_bw - cur_bw) / state.last_bw;
    let interleave_change = state.last_step * -100;
    let saturated = cur_bw >= bw_cutoff;

    let mut cur_step = if !saturated {
        if state.last_step == 0 && bw_change > 0 {
            state.correct_count = 0;
            clamp_kick(proportional_step(state.ratio, bw_change), MIN_STEP, MAX_STEP / 2)
        } else if state.last_step <= 0 {
            state.correct_count = 0;
            (state.last_step.abs() / 2).max(MIN_STEP)
        } else {
            state.correct_count += 1;
            state.last_step
        }
    } else if state.last_step == 0 {
        state.correct_count = 0;
        let kicked = clamp_kick(proportional_step(state.ratio, bw_change), MIN_STEP, MAX_STEP / 2);
        if kicked.abs() < 4 { 0 } else { kicked }
    } else if state.ratio == 100 {
        state.correct_count = 0;
        -state.last_step.abs() / 2
    } else if good_step(bw_change, interleave_change) {
        let bw_int_ratio = (bw_change * 100 / interleave_change).abs();
        if bw_int_ratio < THROTTLE_THRESHOLD {
            bw_int_ratio * state.last_step / 100
        } else {
            state.correct_count += 1;
            state.last_step
        }
    } else {
        state.correct_count = 0;
        -state.last_step / 2
    };

    if state.correct_count >= STREAK_LIMIT {
        cur_step *= 2;
        state.correct_count = 0;
    }

    if cur_step.abs() < MIN_STEP {
        cur_step = 0;
    } else if cur_step.abs() > MAX_STEP {
        cur_step = if cur_step < 0 { -MAX_STEP } else { MAX_STEP };
    }

    if state.last_step != 0 || cur_step != 0 {
        state.last_bw = cur_bw;
    }

    let new_ratio = (state.ratio as i64 + cur_step).clamp(0, 100) as u8;
    state.ratio = new_ratio;
    state.last_step = cur_step;

    Adjustment {
        ratio: new_ratio,
        bw_change,
        interleave_change,
        cur_bw,
    }
}

/// The dead-band/ceiling clamp shared by the two proportional-kick
/// branches: below `floor` in magnitude snaps up to `floor` (sign
/// preserved -- both call sites only reach this with `bw_change` signed
/// the same way `ratio` is, so the sign is never flipped in practice);
/// above `ceiling` in magnitude clamps down to it.
fn clamp_kick(raw: i64, floor: i64, ceiling: i64) -> i64 {
    if raw.abs() < floor {
        floor
    } else if raw.abs() > ceiling {
        if raw > 0 { ceiling } else { -ceiling }
    } else {
        raw
    }
}

/// The weight-sink commit pair for a given ratio: the kernel's weighted
/// interleave control surface treats a weight of 0 as 1, so `ratio == 100`
/// writes `(255, 1)` rather than `(100, 0)`.
pub fn weights_for(ratio: u8) -> (u8, u8) {
    if ratio == 100 { (255, 1) } else { (ratio, 100 - ratio) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unsaturated_flat_bandwidth_backs_off_and_latches_at_255_1() {
        let history = vec![500i64; 10];
        let mut state = ControllerState {
            ratio: 100,
            last_bw: 0,
            last_step: -10,
            correct_count: 0,
        };
        let adj = adjust(&mut state, &history, 1000);
        assert_eq!(adj.cur_bw, 500);
        assert_eq!(adj.bw_change, 0);
        assert_eq!(adj.ratio, 100);
        assert_eq!(weights_for(adj.ratio), (255, 1));
    }

    #[test]
    fn percentile_skips_earliest_half_and_sorts_before_indexing() {
        let history = vec![2000, 1500, 1500, 2000, 2500, 2500, 2000, 1500, 1000, 500];
        assert_eq!(percentile_bw(&history, 80), 2000);
    }

    #[test]
    fn good_step_requires_bandwidth_drop_smaller_than_interleave_change() {
        // Ties and non-drops do not count as good once the ratio has
        // already moved by a nonzero last_step.
        assert!(!good_step(0, -500));
        assert!(good_step(-600, -500));
    }

    #[test]
    fn streak_of_three_good_steps_doubles_and_resets() {
        // Saturated, ratio != 100, predicate true each round, never
        // throttled: three rounds accumulate correct_count to the streak
        // limit and the third round doubles cur_step back to 0 streak.
        let mut state = ControllerState {
            ratio: 50,
            last_bw: 2000,
            last_step: 4,
            correct_count: 2,
        };
        // bw dropping hard enough that bw_change < interleave_change holds:
        // interleave_change = -400, so bw_change must be < -400.
        let history = vec![3000i64; 10];
        let adj = adjust(&mut state, &history, 100);
        assert_eq!(state.correct_count, 0);
        // cur_step should have doubled from 4 to 8 before clamping.
        assert_eq!(adj.ratio as i64 - 50, 8);
    }
}
