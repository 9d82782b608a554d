//! Debounced button driver with short and long press detection.
//!
//! Active-low momentary switch with external pull-up.  The UI task polls
//! the level each iteration and feeds it to [`ButtonDriver::tick`]
//! together with a monotonic millisecond clock; the gesture machine does
//! the rest.
//!
//! | Gesture     | Condition                       |
//! |-------------|---------------------------------|
//! | Short press | released before the long window |
//! | Long press  | held ≥ 1500 ms (power off)      |

const DEBOUNCE_MS: u32 = 30;
const LONG_PRESS_MS: u32 = 1_500;

/// Classified button gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    Debounce { since_ms: u32 },
    Pressed { since_ms: u32 },
    /// Long press reported; swallow the release edge.
    WaitRelease,
}

pub struct ButtonDriver {
    gpio: i32,
    state: GestureState,
}

impl ButtonDriver {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            state: GestureState::Idle,
        }
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Read the (active-low) level on the device; the host caller passes
    /// its own simulated level.
    #[cfg(target_os = "espidf")]
    pub fn read_level(&self) -> bool {
        // SAFETY: plain GPIO level read.
        unsafe { esp_idf_svc::sys::gpio_get_level(self.gpio) == 0 }
    }

    /// Advance the gesture machine.  `pressed` is the raw level,
    /// `now_ms` a monotonic millisecond clock.
    pub fn tick(&mut self, pressed: bool, now_ms: u32) -> Option<ButtonEvent> {
        match self.state {
            GestureState::Idle => {
                if pressed {
                    self.state = GestureState::Debounce { since_ms: now_ms };
                }
                None
            }

            GestureState::Debounce { since_ms } => {
                if !pressed {
                    self.state = GestureState::Idle;
                } else if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = GestureState::Pressed { since_ms };
                }
                None
            }

            GestureState::Pressed { since_ms } => {
                let held = now_ms.wrapping_sub(since_ms);
                if held >= LONG_PRESS_MS {
                    self.state = GestureState::WaitRelease;
                    return Some(ButtonEvent::LongPress);
                }
                if !pressed {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::ShortPress);
                }
                None
            }

            GestureState::WaitRelease => {
                if !pressed {
                    self.state = GestureState::Idle;
                }
                None
            }
        }
    }
}
