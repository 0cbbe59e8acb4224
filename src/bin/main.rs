// frame-os entry point and main loop
//
// Boot sequence: timer -> hardware -> panel init -> first scan
// Main loop: drain scheduler -> WFI -> translate wake flags -> repeat
//
// A 100ms periodic tick drives everything: the power button is polled
// every tick, the charge check runs every second and the card scan
// every two seconds. Holding the power button for 1s releases the
// power latch. A cell voltage above the charge threshold blanks the
// panel until the charger is removed.

#![no_std]
#![no_main]

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::time::Duration;
use esp_hal::timer::PeriodicTimer;
use esp_hal::timer::timg::TimerGroup;
use log::info;

use core::cell::RefCell;
use critical_section::Mutex;

use frame_os::board::Board;
use frame_os::drivers::battery::{self, BatteryMonitor};
use frame_os::drivers::power::PowerButton;
use frame_os::kernel::wake::{self, signal_timer, try_wake};
use frame_os::kernel::{Job, Scheduler};
use frame_os::render::Renderer;

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const TICK_MS: u64 = 100;
const CHARGE_INTERVAL_TICKS: u32 = 10; // 1 second
const SCAN_INTERVAL_TICKS: u32 = 20; // 2 seconds

static TIMER0: Mutex<RefCell<Option<PeriodicTimer<'static, esp_hal::Blocking>>>> =
    Mutex::new(RefCell::new(None));

#[esp_hal::handler(priority = esp_hal::interrupt::Priority::Priority1)]
fn timer0_handler() {
    critical_section::with(|cs| {
        if let Some(timer) = TIMER0.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
    signal_timer();
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    esp_alloc::heap_allocator!(size: 256720);

    info!("booting...");

    let timg0 = TimerGroup::new(unsafe { peripherals.TIMG0.clone_unchecked() });
    let mut timer0 = PeriodicTimer::new(timg0.timer0);
    critical_section::with(|cs| {
        timer0.set_interrupt_handler(timer0_handler);
        timer0.start(Duration::from_millis(TICK_MS)).unwrap();
        timer0.listen();
        TIMER0.borrow_ref_mut(cs).replace(timer0);
    });
    info!("timer initialized.");

    let board = Board::init(peripherals);
    let mut delay = Delay::new();
    let mut lcd = board.display.lcd;
    lcd.init(&mut delay);
    info!("hardware initialized.");

    let mut sched = Scheduler::new();
    let mut renderer = Renderer::new();
    let mut monitor = BatteryMonitor::new(board.battery);
    let mut power = PowerButton::new(board.power);
    let sd = board.storage.sd;

    let mut panel_blanked = false;
    let mut last_charge_ticks: u32 = 0;
    let mut last_scan_ticks: u32 = 0;

    // first frame without waiting out the scan interval
    let _ = sched.push_unique(Job::CheckCharge);
    let _ = sched.push_unique(Job::ScanImages);
    info!("kernel ready.");

    loop {
        // drain all pending jobs by priority (high first, FIFO within tier)
        while let Some(job) = sched.pop() {
            match job {
                Job::PollPower => {
                    if power.poll_shutdown() {
                        info!("power: shutdown requested");
                        lcd.set_backlight(false);
                        lcd.set_power(false);
                        power.power_off();
                    }
                }

                Job::CheckCharge => {
                    let mv = monitor.read_battery_mv();
                    let charging = battery::is_charging(mv);
                    if charging != panel_blanked {
                        info!(
                            "battery: {}mV ({}%), charging: {}",
                            mv,
                            battery::battery_percentage(mv),
                            charging
                        );
                        lcd.set_power(!charging);
                        lcd.set_backlight(!charging);
                        panel_blanked = charging;
                    }
                }

                Job::ScanImages => {
                    renderer.scan_and_show(&mut lcd, &sd);
                }
            }
        }

        // wait for wake event then translate flags into jobs
        let wake = match try_wake() {
            Some(w) => w,
            None => {
                wake::wait_for_interrupt();
                continue;
            }
        };

        if wake.timer {
            let ticks = wake::uptime_ticks();

            let _ = sched.push_unique(Job::PollPower);

            if ticks.wrapping_sub(last_charge_ticks) >= CHARGE_INTERVAL_TICKS {
                last_charge_ticks = ticks;
                let _ = sched.push_unique(Job::CheckCharge);
            }

            if ticks.wrapping_sub(last_scan_ticks) >= SCAN_INTERVAL_TICKS {
                last_scan_ticks = ticks;
                let _ = sched.push_unique(Job::ScanImages);
            }
        }
    }
}
