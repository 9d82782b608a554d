//! GPIO / peripheral pin assignments for the SkyLink transmitter board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// LoRa radio (SX1276 module on SPI2)
// ---------------------------------------------------------------------------

pub const RADIO_MOSI_GPIO: i32 = 11;
pub const RADIO_MISO_GPIO: i32 = 13;
pub const RADIO_SCK_GPIO: i32 = 12;
/// SPI chip select (active LOW).
pub const RADIO_CS_GPIO: i32 = 10;
/// Radio hardware reset (active LOW, pulsed during driver init).
pub const RADIO_RST_GPIO: i32 = 9;
/// DIO0 interrupt line — TX-done / RX-done.  The control-input task
/// initializes the driver so this IRQ is serviced on its own core.
pub const RADIO_DIO0_GPIO: i32 = 14;

// ---------------------------------------------------------------------------
// Control input (gimbal ADC channels, ADC1)
// ---------------------------------------------------------------------------

/// Gimbal axis ADC pins: roll, pitch, throttle, yaw.
pub const STICK_ADC_GPIOS: [i32; 4] = [1, 2, 3, 4];
/// ADC attenuation for the stick channels (11 dB → 0 – 3.1 V range).
pub const STICK_ADC_ATTEN: u32 = 3; // esp_idf_hal::adc::attenuation::DB_11

// ---------------------------------------------------------------------------
// UI — button, beeper, optional OLED
// ---------------------------------------------------------------------------

/// Momentary push-button (active-low with external pull-up).
pub const BUTTON_GPIO: i32 = 0;
/// Piezo beeper driven by an LEDC tone channel.
pub const BEEPER_GPIO: i32 = 18;

/// SSD1306 OLED on I²C0.  The screen is optional; boot probes the bus
/// and degrades gracefully when nothing answers at [`SCREEN_I2C_ADDR`].
pub const SCREEN_SDA_GPIO: i32 = 5;
pub const SCREEN_SCL_GPIO: i32 = 6;
pub const SCREEN_RST_GPIO: i32 = 7;
pub const SCREEN_I2C_ADDR: u8 = 0x3C;

// ---------------------------------------------------------------------------
// Beeper tone configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits) for the beeper channel.
pub const BEEPER_PWM_RESOLUTION_BITS: u32 = 8;
/// Default beeper tone frequency.
pub const BEEPER_TONE_HZ: u32 = 2_700;
