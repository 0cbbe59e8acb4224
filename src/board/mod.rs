//! Photo frame Board Support Package (BSP)
//!
//! Maps physical hardware to named subsystems so that the rest of the
//! firmware doesn't need to know GPIO numbers or peripheral details.
//! The ST7789 and the SD card share SPI2; each gets its own
//! RefCellDevice with a dedicated chip select.

pub mod display;
pub mod pins;
pub mod sdcard;

pub use display::{DisplayDriver, HEIGHT, SPI_FREQ_MHZ, WIDTH};
pub use sdcard::SdStorage;

use alloc::boxed::Box;
use core::cell::RefCell;

use embedded_hal_bus::spi::RefCellDevice;
use esp_hal::{
    Blocking,
    analog::adc::{Adc, AdcCalCurve, AdcConfig, AdcPin, Attenuation},
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    peripherals::{ADC1, GPIO0, Peripherals},
    spi,
    time::Rate,
};

// Type Aliases
pub type SpiBus = spi::master::Spi<'static, Blocking>;
pub type SharedSpiDevice = RefCellDevice<'static, SpiBus, Output<'static>, Delay>;
pub type Lcd =
    DisplayDriver<SharedSpiDevice, Output<'static>, Output<'static>, Output<'static>>;

// Hardware Bundles
/// Display subsystem hardware: ST7789 driver, not yet initialized.
pub struct DisplayHw {
    pub lcd: Lcd,
}

/// Storage subsystem hardware: SD card behind the shared bus.
pub struct StorageHw {
    pub sd: SdStorage<SharedSpiDevice>,
}

/// Power latch output and power button sense input.
pub struct PowerHw {
    pub sys_en: Output<'static>,
    pub sys_out: Input<'static>,
}

/// Battery voltage sense: calibrated ADC behind a 3:1 divider.
pub struct BatteryHw {
    pub adc: Adc<'static, ADC1<'static>, Blocking>,
    pub vbat: AdcPin<GPIO0<'static>, ADC1<'static>, AdcCalCurve<ADC1<'static>>>,
}

/// Complete board hardware, ready for driver initialization.
pub struct Board {
    pub display: DisplayHw,
    pub storage: StorageHw,
    pub power: PowerHw,
    pub battery: BatteryHw,
}

impl Board {
    pub fn init(p: Peripherals) -> Self {
        // Latch the power rail on before anything else; until SYS_EN is
        // driven high the board only runs while the button is held.
        let sys_en = Output::new(
            unsafe { p.GPIO2.clone_unchecked() },
            Level::High,
            OutputConfig::default(),
        );
        let sys_out = Input::new(
            unsafe { p.GPIO3.clone_unchecked() },
            InputConfig::default().with_pull(Pull::Up),
        );

        let battery = Self::init_battery(&p);
        let (display, storage) = Self::init_spi_bus(p);

        Board {
            display,
            storage,
            power: PowerHw { sys_en, sys_out },
            battery,
        }
    }

    fn init_battery(p: &Peripherals) -> BatteryHw {
        let mut adc_cfg = AdcConfig::new();

        // 11dB attenuation for the full 0-3.3V input range
        let vbat = adc_cfg.enable_pin_with_cal::<_, AdcCalCurve<ADC1>>(
            unsafe { p.GPIO0.clone_unchecked() },
            Attenuation::_11dB,
        );

        let adc = Adc::new(unsafe { p.ADC1.clone_unchecked() }, adc_cfg);

        BatteryHw { adc, vbat }
    }

    fn init_spi_bus(p: Peripherals) -> (DisplayHw, StorageHw) {
        // GPIO setup
        let lcd_cs = Output::new(p.GPIO21, Level::High, OutputConfig::default());
        let lcd_dc = Output::new(p.GPIO4, Level::High, OutputConfig::default());
        let lcd_rst = Output::new(p.GPIO5, Level::High, OutputConfig::default());
        let lcd_bl = Output::new(p.GPIO6, Level::Low, OutputConfig::default());
        let sd_cs = Output::new(p.GPIO12, Level::High, OutputConfig::default());

        // Shared SPI bus; the RefCell lives for the life of the program
        let spi_cfg =
            spi::master::Config::default().with_frequency(Rate::from_mhz(SPI_FREQ_MHZ));
        let spi_bus = spi::master::Spi::new(p.SPI2, spi_cfg)
            .unwrap()
            .with_sck(p.GPIO8)
            .with_mosi(p.GPIO10)
            .with_miso(p.GPIO7);
        let bus: &'static RefCell<SpiBus> = Box::leak(Box::new(RefCell::new(spi_bus)));

        let lcd_dev = RefCellDevice::new(bus, lcd_cs, Delay::new()).unwrap();
        let sd_dev = RefCellDevice::new(bus, sd_cs, Delay::new()).unwrap();

        let lcd = DisplayDriver::new(lcd_dev, lcd_dc, lcd_rst, lcd_bl);
        let sd = SdStorage::new(sd_dev);

        (DisplayHw { lcd }, StorageHw { sd })
    }
}
