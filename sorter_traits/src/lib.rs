pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Full-scale duty for the 11-bit PWM the motor driver expects (0..=2047).
pub const DUTY_MAX: u16 = 2047;

/// Full-scale analog reading from the reflectance/presence sensor (12-bit ADC).
pub const ANALOG_MAX: u16 = 4095;

/// Rotation direction of the axis. Physical pin polarity is the driver's
/// concern; the core only ever reasons about Forward/Reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// The opposite direction.
    #[inline]
    pub fn invert(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Operator pushbutton identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    One,
    Two,
}

/// Debounced button level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Quadrature encoder counter: a monotonic signed count, resettable to zero.
/// The count is undefined only across `reset()`, which the core invokes as a
/// controlled event (homing or power-on).
pub trait Encoder {
    fn read(&mut self) -> Result<i64, Box<dyn std::error::Error + Send + Sync>>;
    fn reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// PWM motor driver. `duty` is clamped by callers to `DUTY_MAX`; duty 0 is
/// the only stop primitive.
pub trait MotorDriver {
    fn drive(
        &mut self,
        direction: Direction,
        duty: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Analog reflectance sensor plus the two operator buttons.
pub trait Sensor {
    fn read_analog(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>>;
    fn read_button(
        &mut self,
        button: Button,
    ) -> Result<ButtonState, Box<dyn std::error::Error + Send + Sync>>;
}

/// Two-line status display. Fire-and-forget: the core rate-limits refreshes,
/// the sink just renders.
pub trait StatusSink {
    fn show(
        &mut self,
        top: &str,
        bottom: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// Boxed forwarding so dynamic (boxed) assemblies satisfy the same bounds as
// statically dispatched ones.

impl<T: Encoder + ?Sized> Encoder for Box<T> {
    fn read(&mut self) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read()
    }
    fn reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).reset()
    }
}

impl<T: MotorDriver + ?Sized> MotorDriver for Box<T> {
    fn drive(
        &mut self,
        direction: Direction,
        duty: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).drive(direction, duty)
    }
}

impl<T: Sensor + ?Sized> Sensor for Box<T> {
    fn read_analog(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_analog()
    }
    fn read_button(
        &mut self,
        button: Button,
    ) -> Result<ButtonState, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_button(button)
    }
}

impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    fn show(
        &mut self,
        top: &str,
        bottom: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).show(top, bottom)
    }
}
