//! GPIO |     Function    |      Notes
//! -----+-----------------+----------------------------------
//!  0   | ADC - Battery   | Voltage divider (3:1), reads 1/3 actual voltage
//!  2   | SYS_EN          | Power latch output, HIGH keeps the board alive
//!  3   | SYS_OUT         | Power button sense, active LOW, internal pullup
//!  4   | LCD DC          | Data/Command select
//!  5   | LCD RST         | Reset (active low)
//!  6   | LCD BL          | Backlight enable, active HIGH
//!  7   | SPI2 MISO       | SD card data out (display is write-only)
//!  8   | SPI2 SCK        | Shared SPI clock
//! 10   | SPI2 MOSI       | Shared SPI data out
//! 12   | SD CS           | SD card chip select
//! 21   | LCD CS          | Display chip select

// ----- ST7789 LCD -----
pub const LCD_CS: u8 = 21;
pub const LCD_DC: u8 = 4;
pub const LCD_RST: u8 = 5;
pub const LCD_BL: u8 = 6;

// ----- SD Card -----
pub const SD_CS: u8 = 12;

// ----- SPI Bus (shared: LCD + SD) -----
pub const SPI_SCK: u8 = 8;
pub const SPI_MOSI: u8 = 10;
pub const SPI_MISO: u8 = 7; // SD card read; display doesn't use MISO

// ----- Power latch + button -----
pub const SYS_EN: u8 = 2; // output, drive LOW to cut power
pub const SYS_OUT: u8 = 3; // input, active LOW while the button is held

// ----- Battery -----
pub const BATTERY_ADC: u8 = 0; // GPIO0 - voltage divider, 1/3 of battery voltage
