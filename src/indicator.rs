use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorId {
    /// Red: harness waiting for a mode byte.
    Idle,
    /// Green: a mode has been selected.
    Active,
}

pub trait Indicators {
    fn set(&mut self, id: IndicatorId, on: bool);
}

/// Indicator pair without hardware behind it; state changes go to the log.
#[derive(Debug, Default, Clone)]
pub struct LogIndicators {
    pub idle: bool,
    pub active: bool,
    /// Number of state changes, for checking "once per mode change".
    pub changes: u32,
}

impl Indicators for LogIndicators {
    fn set(&mut self, id: IndicatorId, on: bool) {
        let slot = match id {
            IndicatorId::Idle => &mut self.idle,
            IndicatorId::Active => &mut self.active,
        };
        if *slot != on {
            *slot = on;
            self.changes += 1;
            debug!(?id, on, "indicator");
        }
    }
}
