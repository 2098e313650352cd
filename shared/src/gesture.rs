//! Long-press detection on the map surface.
//!
//! The classifier is a plain state machine: `update` feeds it
//! [`MapEvent`]s and timer expiries, and it answers with at most one
//! [`Gesture`] and at most one timer for the shell to arm. Each armed
//! timer carries a token; arming a new one or leaving `Pending`
//! invalidates the previous token, so a late expiry is ignored.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GestureConfig;
use crate::event::{Gesture, MapEvent};
use crate::model::{Coordinate, UnixTimeMs};

/// How the platform's map widget reports presses.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GestureStrategy {
    /// Only generic click messages; a delayed check measures the hold.
    ClickTiming,
    /// The widget emits its own long-press callback.
    Native,
    /// Press-in/press-out pairs; a short timer emulates long-press.
    #[default]
    PressTimer,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerRequest {
    pub token: TimerToken,
    pub delay_ms: u64,
    /// Event time at which the timer is due.
    pub fire_at: UnixTimeMs,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum GestureState {
    Idle,
    Pending {
        started_at: UnixTimeMs,
        coordinate: Coordinate,
        token: TimerToken,
    },
    Fired,
}

/// Result of feeding one event.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Step {
    pub gesture: Option<Gesture>,
    pub timer: Option<TimerRequest>,
}

impl Step {
    fn none() -> Self {
        Self::default()
    }

    fn gesture(gesture: Gesture) -> Self {
        Self {
            gesture: Some(gesture),
            timer: None,
        }
    }

    fn timer(timer: TimerRequest) -> Self {
        Self {
            gesture: None,
            timer: Some(timer),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GestureClassifier {
    strategy: GestureStrategy,
    config: GestureConfig,
    state: GestureState,
    next_token: u64,
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            strategy: config.strategy,
            config,
            state: GestureState::Idle,
            next_token: 0,
        }
    }

    pub fn strategy(&self) -> GestureStrategy {
        self.strategy
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, GestureState::Pending { .. })
    }

    pub fn handle(&mut self, event: &MapEvent) -> Step {
        // A pan or zoom always drops whatever press was being tracked.
        if let MapEvent::RegionChanged { .. } = event {
            if self.is_pending() {
                debug!("drag cancelled pending long-press");
            }
            self.state = GestureState::Idle;
            return Step::gesture(Gesture::Drag);
        }

        match self.strategy {
            GestureStrategy::ClickTiming => self.handle_click_timing(event),
            GestureStrategy::Native => self.handle_native(event),
            GestureStrategy::PressTimer => self.handle_press_timer(event),
        }
    }

    /// Timer expiry. `now` is the event time the timer fired at.
    pub fn on_timer(&mut self, token: TimerToken, now: UnixTimeMs) -> Option<Gesture> {
        let GestureState::Pending {
            started_at,
            coordinate,
            token: live,
        } = self.state
        else {
            debug!(?token, "timer fired with nothing pending");
            return None;
        };

        if live != token {
            debug!(?token, ?live, "stale timer ignored");
            return None;
        }

        let required = match self.strategy {
            GestureStrategy::ClickTiming => self.config.long_press_threshold_ms,
            GestureStrategy::PressTimer => self.config.press_timer_ms,
            GestureStrategy::Native => 0,
        };

        if now.elapsed_since(started_at) >= required {
            debug!(%coordinate, "long-press fired");
            self.state = GestureState::Fired;
            Some(Gesture::LongPress(coordinate))
        } else {
            debug!("press released early, consumed");
            self.state = GestureState::Idle;
            None
        }
    }

    fn handle_click_timing(&mut self, event: &MapEvent) -> Step {
        let MapEvent::Clicked { at, coordinate } = *event else {
            return Step::none();
        };

        if self.is_pending() {
            debug!("second click before check, treated as tap");
            self.state = GestureState::Idle;
            return Step::gesture(Gesture::Tap(coordinate));
        }

        let delay = self
            .config
            .long_press_threshold_ms
            .saturating_add(self.config.long_press_epsilon_ms);
        Step::timer(self.arm(at, coordinate, delay))
    }

    fn handle_native(&mut self, event: &MapEvent) -> Step {
        match *event {
            MapEvent::NativeLongPress { coordinate, .. } => {
                self.state = GestureState::Fired;
                Step::gesture(Gesture::LongPress(coordinate))
            }
            MapEvent::Clicked { coordinate, .. } => {
                self.state = GestureState::Idle;
                Step::gesture(Gesture::Tap(coordinate))
            }
            _ => Step::none(),
        }
    }

    fn handle_press_timer(&mut self, event: &MapEvent) -> Step {
        match *event {
            MapEvent::PressIn { at, coordinate } => {
                Step::timer(self.arm(at, coordinate, self.config.press_timer_ms))
            }
            MapEvent::PressOut { .. } => match self.state {
                GestureState::Pending { coordinate, .. } => {
                    debug!("press-out before timer, tap");
                    self.state = GestureState::Idle;
                    Step::gesture(Gesture::Tap(coordinate))
                }
                _ => {
                    self.state = GestureState::Idle;
                    Step::none()
                }
            },
            MapEvent::Clicked { coordinate, .. } if !self.is_pending() => {
                Step::gesture(Gesture::Tap(coordinate))
            }
            _ => Step::none(),
        }
    }

    fn arm(&mut self, at: UnixTimeMs, coordinate: Coordinate, delay_ms: u64) -> TimerRequest {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.state = GestureState::Pending {
            started_at: at,
            coordinate,
            token,
        };
        debug!(?token, delay_ms, "long-press timer armed");
        TimerRequest {
            token,
            delay_ms,
            fire_at: at.add_millis(delay_ms),
        }
    }
}
