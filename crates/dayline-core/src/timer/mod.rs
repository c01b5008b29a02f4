mod engine;
pub(crate) mod stopwatch;

pub use engine::{
    LifecycleEvent, PersistedTimer, TimerColor, TimerEngine, TimerRuntimeState, TimerSettings,
    TimerState,
};
pub use stopwatch::Stopwatch;
