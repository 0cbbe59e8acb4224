// Li-ion battery voltage estimation and charge detection
//
// GPIO0 reads through a 200K/100K divider (3:1). ADC with 11dB
// attenuation gives 0..2500mV; multiply by 3 for actual cell voltage.
// A cell sitting above 3.98V is on the charger; the panel is blanked
// while charging to keep the charge current useful.
// Linear percentage approximation: 4200mV = 100%, 3000mV = 0%.

use crate::board::BatteryHw;

const DIVIDER_MULT: u32 = 3;

const VBAT_FULL_MV: u32 = 4200;
const VBAT_EMPTY_MV: u32 = 3000;
const VBAT_CHARGING_MV: u16 = 3980;

// single ADC reads on this board are noisy, average a burst
const SAMPLE_COUNT: u32 = 64;

pub struct BatteryMonitor {
    hw: BatteryHw,
}

impl BatteryMonitor {
    pub fn new(hw: BatteryHw) -> Self {
        Self { hw }
    }

    /// Averaged cell voltage in millivolts.
    pub fn read_battery_mv(&mut self) -> u16 {
        let mut sum: u32 = 0;
        for _ in 0..SAMPLE_COUNT {
            let mv: u16 = nb::block!(self.hw.adc.read_oneshot(&mut self.hw.vbat)).unwrap_or(0);
            sum += mv as u32;
        }
        adc_to_battery_mv((sum / SAMPLE_COUNT) as u16)
    }
}

pub fn adc_to_battery_mv(adc_mv: u16) -> u16 {
    (adc_mv as u32 * DIVIDER_MULT) as u16
}

pub fn is_charging(battery_mv: u16) -> bool {
    battery_mv > VBAT_CHARGING_MV
}

pub fn battery_percentage(battery_mv: u16) -> u8 {
    let mv = battery_mv as u32;
    if mv >= VBAT_FULL_MV {
        100
    } else if mv <= VBAT_EMPTY_MV {
        0
    } else {
        ((mv - VBAT_EMPTY_MV) * 100 / (VBAT_FULL_MV - VBAT_EMPTY_MV)) as u8
    }
}
