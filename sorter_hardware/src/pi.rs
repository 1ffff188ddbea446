//! Raspberry Pi drivers (rppal): LS7366R quadrature counter over SPI, PWM
//! motor driver, MCP3008 ADC for the reflectance sensor, pull-up buttons,
//! and the Grove 16x2 RGB LCD over I2C.
//!
//! Pin polarity quirks live here, not in the core: `dir_active_high` absorbs
//! the direction-line inversion some driver-board revisions need.

use std::error::Error;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;
use rppal::pwm::{Channel, Polarity, Pwm};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use sorter_traits::{
    Button, ButtonState, DUTY_MAX, Direction, Encoder, MotorDriver, Sensor, StatusSink,
};

use crate::error::HwError;

/// PWM carrier, matching the 25 kHz the motor driver expects.
const PWM_FREQ_HZ: f64 = 25_000.0;

/// Raw button level must hold this long before the debounced state flips.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(10);

fn slave_select(cs: u8) -> Result<SlaveSelect, HwError> {
    match cs {
        0 => Ok(SlaveSelect::Ss0),
        1 => Ok(SlaveSelect::Ss1),
        2 => Ok(SlaveSelect::Ss2),
        other => Err(HwError::Spi(format!("unsupported chip-select {other}"))),
    }
}

// ── LS7366R quadrature counter ──────────────────────────────────────────

const LS7366_WR_MDR0: u8 = 0x88;
const LS7366_WR_MDR1: u8 = 0x90;
const LS7366_CLR_CNTR: u8 = 0x20;
const LS7366_RD_CNTR: u8 = 0x60;
/// x4 quadrature, free-running, index disabled.
const MDR0_QUAD_X4: u8 = 0x03;
/// 4-byte counter, counting enabled.
const MDR1_4BYTE: u8 = 0x00;

pub struct Ls7366Encoder {
    spi: Spi,
}

impl Ls7366Encoder {
    pub fn new(cs: u8) -> Result<Self, HwError> {
        let spi = Spi::new(Bus::Spi0, slave_select(cs)?, 1_000_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let mut enc = Self { spi };
        enc.write(&[LS7366_WR_MDR0, MDR0_QUAD_X4])?;
        enc.write(&[LS7366_WR_MDR1, MDR1_4BYTE])?;
        enc.write(&[LS7366_CLR_CNTR])?;
        tracing::debug!(cs, "LS7366R configured for x4 quadrature");
        Ok(enc)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HwError> {
        self.spi
            .write(bytes)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(())
    }
}

impl Encoder for Ls7366Encoder {
    fn read(&mut self) -> Result<i64, Box<dyn Error + Send + Sync>> {
        let tx = [LS7366_RD_CNTR, 0, 0, 0, 0];
        let mut rx = [0u8; 5];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| Box::new(HwError::Spi(e.to_string())) as _)?;
        let raw = i32::from_be_bytes([rx[1], rx[2], rx[3], rx[4]]);
        Ok(i64::from(raw))
    }

    fn reset(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.write(&[LS7366_CLR_CNTR])
            .map_err(|e| Box::new(e) as _)
    }
}

// ── PWM motor driver ────────────────────────────────────────────────────

pub struct PwmMotor {
    pwm: Pwm,
    dir: OutputPin,
    dir_active_high: bool,
}

impl PwmMotor {
    pub fn new(channel: u8, dir_pin: u8, dir_active_high: bool) -> Result<Self, HwError> {
        let channel = match channel {
            0 => Channel::Pwm0,
            1 => Channel::Pwm1,
            other => return Err(HwError::Pwm(format!("unsupported PWM channel {other}"))),
        };
        let pwm = Pwm::with_frequency(channel, PWM_FREQ_HZ, 0.0, Polarity::Normal, true)
            .map_err(|e| HwError::Pwm(e.to_string()))?;
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dir = gpio
            .get(dir_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        Ok(Self {
            pwm,
            dir,
            dir_active_high,
        })
    }
}

impl MotorDriver for PwmMotor {
    fn drive(&mut self, direction: Direction, duty: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        let forward_level_high = self.dir_active_high;
        match (direction, forward_level_high) {
            (Direction::Forward, true) | (Direction::Reverse, false) => self.dir.set_high(),
            (Direction::Forward, false) | (Direction::Reverse, true) => self.dir.set_low(),
        }
        let fraction = f64::from(duty.min(DUTY_MAX)) / f64::from(DUTY_MAX);
        self.pwm
            .set_duty_cycle(fraction)
            .map_err(|e| Box::new(HwError::Pwm(e.to_string())) as _)
    }
}

// ── MCP3008 sensor + debounced buttons ──────────────────────────────────

struct DebouncedPin {
    pin: InputPin,
    stable: ButtonState,
    candidate: ButtonState,
    since: Instant,
}

impl DebouncedPin {
    fn new(pin: InputPin) -> Self {
        Self {
            pin,
            stable: ButtonState::Released,
            candidate: ButtonState::Released,
            since: Instant::now(),
        }
    }

    fn read(&mut self) -> ButtonState {
        // Active low: the pull-up keeps the line high until pressed.
        let raw = if self.pin.is_low() {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        };
        if raw != self.candidate {
            self.candidate = raw;
            self.since = Instant::now();
        } else if raw != self.stable && self.since.elapsed() >= DEBOUNCE_WINDOW {
            self.stable = raw;
        }
        self.stable
    }
}

pub struct PiSensor {
    spi: Spi,
    channel: u8,
    button1: DebouncedPin,
    button2: DebouncedPin,
}

impl PiSensor {
    pub fn new(adc_cs: u8, adc_channel: u8, button1: u8, button2: u8) -> Result<Self, HwError> {
        if adc_channel > 7 {
            return Err(HwError::Spi(format!("MCP3008 channel {adc_channel} out of range")));
        }
        let spi = Spi::new(Bus::Spi0, slave_select(adc_cs)?, 1_350_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let b1 = gpio
            .get(button1)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();
        let b2 = gpio
            .get(button2)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();
        Ok(Self {
            spi,
            channel: adc_channel,
            button1: DebouncedPin::new(b1),
            button2: DebouncedPin::new(b2),
        })
    }
}

impl Sensor for PiSensor {
    fn read_analog(&mut self) -> Result<u16, Box<dyn Error + Send + Sync>> {
        let tx = [0x01, 0x80 | (self.channel << 4), 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| Box::new(HwError::Spi(e.to_string())) as _)?;
        let ten_bit = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        // Scale the 10-bit conversion onto the 12-bit interface range.
        Ok(ten_bit << 2)
    }

    fn read_button(&mut self, button: Button) -> Result<ButtonState, Box<dyn Error + Send + Sync>> {
        Ok(match button {
            Button::One => self.button1.read(),
            Button::Two => self.button2.read(),
        })
    }
}

// ── Grove 16x2 RGB LCD ──────────────────────────────────────────────────

const LCD_ADDR: u16 = 0x3e;
const RGB_ADDR: u16 = 0x62;
const LCD_CMD: u8 = 0x80;
const LCD_DATA: u8 = 0x40;

pub struct GroveLcd {
    i2c: I2c,
}

impl GroveLcd {
    pub fn new() -> Result<Self, HwError> {
        let i2c = I2c::new().map_err(|e| HwError::I2c(e.to_string()))?;
        let mut lcd = Self { i2c };
        // HD44780-style init: 2 lines, display on, clear, left-to-right.
        lcd.command(0x28)?;
        lcd.command(0x0C)?;
        lcd.command(0x01)?;
        std::thread::sleep(Duration::from_millis(2));
        lcd.command(0x06)?;
        // Backlight controller out of standby, group PWM enabled.
        lcd.rgb_register(0x00, 0x00)?;
        lcd.rgb_register(0x01, 0x00)?;
        lcd.rgb_register(0x08, 0xAA)?;
        lcd.set_rgb(50, 50, 50)?;
        Ok(lcd)
    }

    fn command(&mut self, cmd: u8) -> Result<(), HwError> {
        self.i2c
            .set_slave_address(LCD_ADDR)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.i2c
            .write(&[LCD_CMD, cmd])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(())
    }

    fn rgb_register(&mut self, reg: u8, value: u8) -> Result<(), HwError> {
        self.i2c
            .set_slave_address(RGB_ADDR)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.i2c
            .write(&[reg, value])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(())
    }

    pub fn set_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<(), HwError> {
        self.rgb_register(0x04, r)?;
        self.rgb_register(0x03, g)?;
        self.rgb_register(0x02, b)?;
        Ok(())
    }

    fn write_line(&mut self, row: u8, text: &str) -> Result<(), HwError> {
        self.command(0x80 | if row == 0 { 0x00 } else { 0x40 })?;
        self.i2c
            .set_slave_address(LCD_ADDR)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        for byte in text.bytes().take(16) {
            self.i2c
                .write(&[LCD_DATA, byte])
                .map_err(|e| HwError::I2c(e.to_string()))?;
        }
        Ok(())
    }
}

impl StatusSink for GroveLcd {
    fn show(&mut self, top: &str, bottom: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        // Backlight color mirrors the state tag, as the operators expect:
        // red for faults, blue while homing, green otherwise.
        let color = if top.starts_with("FAULT") {
            (255, 0, 0)
        } else if top.starts_with("HOMING") {
            (0, 0, 255)
        } else {
            (0, 255, 0)
        };
        self.set_rgb(color.0, color.1, color.2)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        self.write_line(0, top)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        self.write_line(1, bottom)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        Ok(())
    }
}
