/// Deterministic tick counter used for event timestamps and input device
/// update stamps. Ticks only advance when the core performs work, so a
/// replayed scenario produces an identical timeline.
#[derive(Debug, Default)]
pub struct DeterministicClock {
    tick: u64,
}

impl DeterministicClock {
    pub fn new() -> Self {
        Self { tick: 0 }
    }

    pub fn tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn now(&self) -> u64 {
        self.tick
    }
}
