//! Test and helper mocks for sorter_core.

use sorter_traits::{Button, ButtonState, Sensor, StatusSink};

/// A sensor that always errors; useful when a loop is driven entirely by
/// externally injected readings.
pub struct NoopSensor;

impl Sensor for NoopSensor {
    fn read_analog(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop sensor")))
    }
    fn read_button(
        &mut self,
        _button: Button,
    ) -> Result<ButtonState, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop sensor")))
    }
}

/// A display that discards every frame.
pub struct NullDisplay;

impl StatusSink for NullDisplay {
    fn show(
        &mut self,
        _top: &str,
        _bottom: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
