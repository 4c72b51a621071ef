use thiserror::Error;

/// Relative tolerance used when matching sample times against the time grid.
const GRID_TOLERANCE: f64 = 1e-6;

/// Length of the start-up transient discarded from every trajectory.
pub const WARM_UP_SECS: f64 = 1.0;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum WindowError {
    #[error("time step must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("trip duration {trip_duration} s is not a positive multiple of the time step {time_step} s")]
    NotAMultiple { trip_duration: f64, time_step: f64 },
    #[error(
        "trip duration {trip_duration} s leaves no samples after the {} s warm-up",
        WARM_UP_SECS
    )]
    NoObservedSteps { trip_duration: f64 },
}

/// The fixed observation horizon of every trip, on a regular time grid.
///
/// Sample times are matched to grid ticks with a small tolerance instead of
/// exact float equality, so `0.30000000000000004` counts as tick 3 of a 0.1 s
/// grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationWindow {
    trip_duration: f64,
    time_step: f64,
    ticks: u64,
}

impl ObservationWindow {
    pub fn new(trip_duration: f64, time_step: f64) -> Result<Self, WindowError> {
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(WindowError::NonPositiveStep(time_step));
        }
        let ratio = trip_duration / time_step;
        let ticks = ratio.round();
        if !ratio.is_finite() || ticks < 1.0 || (ratio - ticks).abs() > GRID_TOLERANCE * ticks {
            return Err(WindowError::NotAMultiple {
                trip_duration,
                time_step,
            });
        }
        let window = Self {
            trip_duration,
            time_step,
            ticks: ticks as u64,
        };
        if window.n_time_steps() == 0 {
            return Err(WindowError::NoObservedSteps { trip_duration });
        }
        Ok(window)
    }

    pub fn trip_duration(&self) -> f64 {
        self.trip_duration
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Number of grid ticks in `[0, trip_duration)`.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Time of the last sample inside the horizon, `trip_duration - time_step`.
    pub fn last_time(&self) -> f64 {
        self.tick_time(self.ticks - 1)
    }

    pub fn tick_time(&self, tick: u64) -> f64 {
        tick as f64 * self.time_step
    }

    fn tolerance(&self) -> f64 {
        self.time_step * GRID_TOLERANCE
    }

    /// Whether `time` is the last tick of the horizon.
    pub fn is_last_tick(&self, time: f64) -> bool {
        (time - self.last_time()).abs() <= self.tolerance()
    }

    /// Whether `time` lies in the warm-up interval `[0, 1 - time_step]`.
    pub fn is_warm_up(&self, time: f64) -> bool {
        time <= WARM_UP_SECS - self.time_step + self.tolerance()
    }

    /// Whether `time` lies past the last tick of the horizon.
    pub fn is_past_horizon(&self, time: f64) -> bool {
        time > self.last_time() + self.tolerance()
    }

    /// Number of grid ticks that fall inside the warm-up interval.
    pub fn warm_up_ticks(&self) -> u64 {
        let last = (WARM_UP_SECS - self.time_step) / self.time_step;
        if last < -GRID_TOLERANCE {
            return 0;
        }
        let count = (last + GRID_TOLERANCE).floor() as u64 + 1;
        count.min(self.ticks)
    }

    /// Rows each survivor keeps after trimming: `(trip_duration - 1) / time_step`
    /// when the step divides one second.
    pub fn n_time_steps(&self) -> u64 {
        self.ticks - self.warm_up_ticks()
    }
}
