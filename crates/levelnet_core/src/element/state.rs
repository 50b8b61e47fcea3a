use crate::model::ElementConfig;
use crate::regulation::TableState;

/// Regulation outcome recorded after each evaluation.
pub type Marker = i8;

pub const MARKER_UP: Marker = 1;
pub const MARKER_HOLD: Marker = 0;
pub const MARKER_DOWN: Marker = -1;

/// Fixed-capacity ring buffer of regulation markers; oldest entries are evicted.
#[derive(Debug, Clone)]
pub struct ScoreHistory {
    buffer: Vec<Marker>,
    /// Next write position
    idx: usize,
    /// Entries written, saturating at capacity
    count: usize,
}

impl ScoreHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![MARKER_HOLD; capacity],
            idx: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn push(&mut self, marker: Marker) {
        self.buffer[self.idx] = marker;
        self.idx = (self.idx + 1) % self.buffer.len();
        if self.count < self.buffer.len() {
            self.count += 1;
        }
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<Marker> {
        (self.count > 0).then(|| self.buffer[(self.idx + self.buffer.len() - 1) % self.buffer.len()])
    }

    /// Entries from newest to oldest.
    pub fn recent(&self) -> impl Iterator<Item = Marker> + '_ {
        let cap = self.buffer.len();
        (1..=self.count).map(move |back| self.buffer[(self.idx + cap - back) % cap])
    }

    /// How many of the last `window` entries equal `marker`.
    ///
    /// Returns 0 when `window` is 0 or fewer than `window` entries exist.
    pub fn count_recent(&self, window: u32, marker: Marker) -> usize {
        let window = window as usize;
        if window == 0 || self.count < window {
            return 0;
        }
        self.recent().take(window).filter(|&m| m == marker).count()
    }
}

/// Mutable per-run state of one element. The element's current level lives
/// in the run's shared value array.
#[derive(Debug, Clone)]
pub struct ElementState {
    /// Level computed in the compute phase, applied at commit
    pub next_value: usize,
    /// Counters parallel to the configured transition delays
    pub curr_delays: Vec<u32>,
    pub curr_spontaneous: u32,
    pub curr_balancing: u32,
    pub scores: ScoreHistory,
    /// Step of the most recent evaluation, 0 before the first one
    pub last_update_step: usize,
    pub table: TableState,
}

impl ElementState {
    pub fn new(config: &ElementConfig, initial: usize) -> Self {
        // a jittered window longer than this can never be satisfied
        let capacity = config.max_delay() as usize + 1;
        Self {
            next_value: initial,
            curr_delays: vec![0; config.delays.len()],
            curr_spontaneous: 0,
            curr_balancing: 0,
            scores: ScoreHistory::with_capacity(capacity),
            last_update_step: 0,
            table: TableState::default(),
        }
    }
}
