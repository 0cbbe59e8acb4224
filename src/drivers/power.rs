// Power latch and shutdown-by-long-press
//
// SYS_EN holds the power rail on; it is driven HIGH during board init
// and stays there until shutdown. SYS_OUT reads the power button
// (active LOW). A continuous hold of 1s requests shutdown; releasing
// the button earlier resets the countdown.

use esp_hal::time::{Duration, Instant};
use log::info;

use crate::board::PowerHw;
use crate::kernel::wake;

const SHUTDOWN_HOLD_MS: u64 = 1000;

pub struct PowerButton {
    hw: PowerHw,
    held_since: Option<Instant>,
}

impl PowerButton {
    pub fn new(hw: PowerHw) -> Self {
        Self {
            hw,
            held_since: None,
        }
    }

    /// Poll the button. Returns true once the hold threshold is reached.
    pub fn poll_shutdown(&mut self) -> bool {
        if self.hw.sys_out.is_low() {
            let now = Instant::now();
            match self.held_since {
                None => {
                    self.held_since = Some(now);
                    false
                }
                Some(since) => now - since >= Duration::from_millis(SHUTDOWN_HOLD_MS),
            }
        } else {
            self.held_since = None;
            false
        }
    }

    /// Release the power latch. The rail drops as soon as the user lets
    /// go of the button; until then we idle.
    pub fn power_off(&mut self) -> ! {
        info!("power: releasing latch");
        self.hw.sys_en.set_low();
        loop {
            wake::wait_for_interrupt();
        }
    }
}
