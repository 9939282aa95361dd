use std::time::Duration;

use uuid::Uuid;

/// Counters from one extraction cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub cycle_id: Uuid,
    pub raw: usize,
    pub new: usize,
    pub loaded: u64,
    pub duration: Duration,
}

impl CycleStats {
    pub fn start() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            raw: 0,
            new: 0,
            loaded: 0,
            duration: Duration::ZERO,
        }
    }
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cycle {} | raw {} | new {} | loaded {} | {:.2}s",
            self.cycle_id,
            self.raw,
            self.new,
            self.loaded,
            self.duration.as_secs_f64()
        )
    }
}

/// Counters from one token-update run.
#[derive(Debug, Default, Clone)]
pub struct UpdateStats {
    pub statuses: Vec<&'static str>,
    pub addresses: usize,
    pub updates: usize,
    pub kept: usize,
    pub loaded: u64,
    pub duration: Duration,
}

impl std::fmt::Display for UpdateStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Token Update Complete ===")?;
        writeln!(f, "Statuses:   {}", self.statuses.join(", "))?;
        writeln!(f, "Addresses:  {}", self.addresses)?;
        writeln!(f, "Updates:    {}", self.updates)?;
        writeln!(f, "Kept:       {}", self.kept)?;
        writeln!(f, "Loaded:     {}", self.loaded)?;
        write!(f, "Duration:   {:.2}s", self.duration.as_secs_f64())
    }
}
