//! Compounding batch sizes and minibatch partitioning.

/// Infinite batch-size schedule: `start`, `start * compound`, ... clipped at
/// `stop`. A schedule with `start > stop` shrinks towards `stop` instead.
#[derive(Debug, Clone)]
pub struct Compounding {
    current: f64,
    start: f64,
    stop: f64,
    compound: f64,
}

impl Compounding {
    pub fn new(start: f64, stop: f64, compound: f64) -> Self {
        Self {
            current: start,
            start,
            stop,
            compound,
        }
    }

    fn clip(&self, value: f64) -> f64 {
        if self.start > self.stop {
            value.max(self.stop)
        } else {
            value.min(self.stop)
        }
    }
}

impl Iterator for Compounding {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let size = self.clip(self.current);
        self.current *= self.compound;
        Some(size)
    }
}

/// Consecutive batches over a slice, sized by a schedule.
#[derive(Debug)]
pub struct Minibatches<'a, T, S> {
    rest: &'a [T],
    sizes: S,
}

/// Split `items` into consecutive batches of `floor(size)` items (at least
/// one) drawn from `sizes`. The final batch may be shorter; every item is
/// yielded exactly once, in order.
pub fn minibatch<T, S>(items: &[T], sizes: S) -> Minibatches<'_, T, S>
where
    S: Iterator<Item = f64>,
{
    Minibatches { rest: items, sizes }
}

impl<'a, T, S> Iterator for Minibatches<'a, T, S>
where
    S: Iterator<Item = f64>,
{
    type Item = &'a [T];

    fn next(&mut self) -> Option<&'a [T]> {
        if self.rest.is_empty() {
            return None;
        }
        let size = self.sizes.next().map_or(self.rest.len(), |s| s as usize);
        let (batch, rest) = self.rest.split_at(size.clamp(1, self.rest.len()));
        self.rest = rest;
        Some(batch)
    }
}
