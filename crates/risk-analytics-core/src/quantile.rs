//! P² streaming quantile estimator.
//!
//! Constant-memory online estimation of a single quantile `q in (0,1)`.
//! Five markers track positions, desired positions, and heights; each
//! `update` is O(1). No direct analogue elsewhere in this workspace — the
//! sort-based `percentile_sorted` helper in `backtest-engine` is kept as
//! the non-streaming baseline; this implements the textbook P² algorithm
//! (Jain & Chlamtac, 1985) in the same plain-function style.

#[derive(Debug, Clone)]
pub struct P2Estimator {
    q: f64,
    count: u64,
    buffer: Vec<f64>,
    markers: [f64; 5],
    desired: [f64; 5],
    increments: [f64; 5],
    heights: [f64; 5],
    initialized: bool,
}

impl P2Estimator {
    pub fn new(q: f64) -> Self {
        assert!(q > 0.0 && q < 1.0, "quantile must be in (0,1)");
        P2Estimator {
            q,
            count: 0,
            buffer: Vec::with_capacity(5),
            markers: [0.0; 5],
            desired: [0.0; 5],
            increments: [0.0, q / 2.0, q, (1.0 + q) / 2.0, 1.0],
            heights: [0.0; 5],
            initialized: false,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn update(&mut self, x: f64) {
        self.count += 1;

        if !self.initialized {
            self.buffer.push(x);
            if self.buffer.len() == 5 {
                self.initialize();
            }
            return;
        }

        // classify into cell k, 0-indexed marker to the right of x
        let k = if x < self.heights[0] {
            self.heights[0] = x;
            0
        } else if x >= self.heights[4] {
            self.heights[4] = x;
            3
        } else {
            let mut k = 0;
            for i in 0..4 {
                if self.heights[i] <= x && x < self.heights[i + 1] {
                    k = i;
                    break;
                }
            }
            k
        };

        for i in (k + 1)..5 {
            self.markers[i] += 1.0;
        }

        let q = self.q;
        self.desired = [
            0.0,
            (self.count as f64 - 1.0) * (q / 2.0),
            (self.count as f64 - 1.0) * q,
            (self.count as f64 - 1.0) * (1.0 + q) / 2.0,
            self.count as f64 - 1.0,
        ];

        for i in 1..4 {
            let d = self.desired[i] - self.markers[i];
            if (d >= 1.0 && self.markers[i + 1] - self.markers[i] > 1.0)
                || (d <= -1.0 && self.markers[i - 1] - self.markers[i] < -1.0)
            {
                let sign = d.signum();
                let parabolic = self.parabolic(i, sign);
                let new_height = if self.heights[i - 1] < parabolic && parabolic < self.heights[i + 1] {
                    parabolic
                } else {
                    self.linear(i, sign)
                };
                self.heights[i] = new_height;
                self.markers[i] += sign;
            }
        }
    }

    fn parabolic(&self, i: usize, sign: f64) -> f64 {
        let qi = self.heights[i];
        let qim1 = self.heights[i - 1];
        let qip1 = self.heights[i + 1];
        let ni = self.markers[i];
        let nim1 = self.markers[i - 1];
        let nip1 = self.markers[i + 1];

        qi + sign / (nip1 - nim1)
            * ((ni - nim1 + sign) * (qip1 - qi) / (nip1 - ni)
                + (nip1 - ni - sign) * (qi - qim1) / (ni - nim1))
    }

    fn linear(&self, i: usize, sign: f64) -> f64 {
        let qi = self.heights[i];
        let ni = self.markers[i];
        if sign > 0.0 {
            qi + (self.heights[i + 1] - qi) / (self.markers[i + 1] - ni)
        } else {
            qi + (self.heights[i - 1] - qi) / (self.markers[i - 1] - ni)
        }
    }

    fn initialize(&mut self) {
        self.buffer
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for i in 0..5 {
            self.heights[i] = self.buffer[i];
            self.markers[i] = i as f64;
        }
        let q = self.q;
        self.desired = [0.0, 4.0 * q, 8.0 * q, 8.0 + 8.0 * (1.0 - q), 4.0];
        self.initialized = true;
    }

    /// Returns the current quantile estimate. Before five observations have
    /// been seen, returns the exact quantile of the buffered values.
    pub fn quantile(&self) -> f64 {
        if self.initialized {
            self.heights[2]
        } else if self.buffer.is_empty() {
            0.0
        } else {
            let mut sorted = self.buffer.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let idx = ((sorted.len() - 1) as f64 * self.q).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        }
    }

    pub fn feed(&mut self, values: impl IntoIterator<Item = f64>) {
        for v in values {
            self.update(v);
        }
    }
}
