//! Simulated axis: encoder, motor, sensor, and operator panel over one
//! shared plant model.
//!
//! The plant integrates the commanded duty into a physical position at
//! `counts_per_sec_at_full` (scaled by duty / DUTY_MAX). The encoder reports
//! position relative to its last reset; the reference marker stays fixed at
//! physical zero, so after a reset on the marker the reported frame matches
//! the physical one, which is what homing establishes on the real mechanism.

use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use sorter_traits::{
    Button, ButtonState, DUTY_MAX, Direction, Encoder, MotorDriver, Sensor, StatusSink,
};

/// Analog level reported while over the marker / away from it.
const SENSOR_HIGH: u16 = 3_500;
const SENSOR_LOW: u16 = 300;

#[derive(Debug, Clone)]
pub struct SimParams {
    /// Plant speed at full duty, in encoder counts per second.
    pub counts_per_sec_at_full: f64,
    /// Half-width of the reflective marker, in counts around physical zero.
    pub marker_halfwidth: i64,
    /// Physical position at power-on (counts; the encoder also starts here,
    /// mirroring an arbitrary power-on count).
    pub start_position: i64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            counts_per_sec_at_full: 2_000.0,
            marker_halfwidth: 30,
            start_position: 0,
        }
    }
}

#[derive(Debug)]
struct PlantState {
    params: SimParams,
    /// Physical position in counts; the marker sits at physical 0.
    physical: f64,
    /// Encoder origin: reported count = physical - origin.
    origin: f64,
    /// Signed commanded velocity fraction (-1.0 ..= 1.0).
    drive: f64,
    last_update: Instant,
    queued_presses: VecDeque<Button>,
}

impl PlantState {
    fn integrate(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        self.physical += self.drive * self.params.counts_per_sec_at_full * dt;
    }

    fn reported(&self) -> i64 {
        (self.physical - self.origin).round() as i64
    }

    fn on_marker(&self) -> bool {
        (self.physical.round() as i64).abs() <= self.params.marker_halfwidth
    }
}

/// Factory for one simulated axis; hand the split parts to the builder.
pub struct SimulatedAxis {
    plant: Arc<Mutex<PlantState>>,
}

impl Default for SimulatedAxis {
    fn default() -> Self {
        Self::new(SimParams::default())
    }
}

impl SimulatedAxis {
    pub fn new(params: SimParams) -> Self {
        let start = params.start_position as f64;
        let plant = PlantState {
            params,
            physical: start,
            origin: 0.0,
            drive: 0.0,
            last_update: Instant::now(),
            queued_presses: VecDeque::new(),
        };
        Self {
            plant: Arc::new(Mutex::new(plant)),
        }
    }

    /// Queue an operator button press; each press is consumed by one
    /// `read_button` call, producing a clean rising edge.
    pub fn queue_press(&self, button: Button) {
        self.lock().queued_presses.push_back(button);
    }

    pub fn encoder(&self) -> SimEncoder {
        SimEncoder {
            plant: self.plant.clone(),
        }
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor {
            plant: self.plant.clone(),
        }
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor {
            plant: self.plant.clone(),
        }
    }

    /// Current physical position (test/diagnostic hook).
    pub fn physical_position(&self) -> i64 {
        let mut plant = self.lock();
        plant.integrate();
        plant.physical.round() as i64
    }

    fn lock(&self) -> MutexGuard<'_, PlantState> {
        self.plant.lock().expect("sim plant poisoned")
    }
}

pub struct SimEncoder {
    plant: Arc<Mutex<PlantState>>,
}

impl Encoder for SimEncoder {
    fn read(&mut self) -> Result<i64, Box<dyn Error + Send + Sync>> {
        let mut plant = self.plant.lock().expect("sim plant poisoned");
        plant.integrate();
        Ok(plant.reported())
    }

    fn reset(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut plant = self.plant.lock().expect("sim plant poisoned");
        plant.integrate();
        plant.origin = plant.physical;
        Ok(())
    }
}

pub struct SimMotor {
    plant: Arc<Mutex<PlantState>>,
}

impl MotorDriver for SimMotor {
    fn drive(&mut self, direction: Direction, duty: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut plant = self.plant.lock().expect("sim plant poisoned");
        plant.integrate();
        let fraction = f64::from(duty.min(DUTY_MAX)) / f64::from(DUTY_MAX);
        plant.drive = match direction {
            Direction::Forward => fraction,
            Direction::Reverse => -fraction,
        };
        Ok(())
    }
}

pub struct SimSensor {
    plant: Arc<Mutex<PlantState>>,
}

impl Sensor for SimSensor {
    fn read_analog(&mut self) -> Result<u16, Box<dyn Error + Send + Sync>> {
        let mut plant = self.plant.lock().expect("sim plant poisoned");
        plant.integrate();
        Ok(if plant.on_marker() { SENSOR_HIGH } else { SENSOR_LOW })
    }

    fn read_button(&mut self, button: Button) -> Result<ButtonState, Box<dyn Error + Send + Sync>> {
        let mut plant = self.plant.lock().expect("sim plant poisoned");
        if plant.queued_presses.front() == Some(&button) {
            plant.queued_presses.pop_front();
            return Ok(ButtonState::Pressed);
        }
        Ok(ButtonState::Released)
    }
}

/// Console status sink for desktop runs.
pub struct ConsoleDisplay;

impl StatusSink for ConsoleDisplay {
    fn show(&mut self, top: &str, bottom: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        println!("[{top}] {bottom}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn motor_moves_the_plant_in_the_commanded_direction() {
        let sim = SimulatedAxis::new(SimParams {
            counts_per_sec_at_full: 10_000.0,
            ..SimParams::default()
        });
        let mut encoder = sim.encoder();
        let mut motor = sim.motor();

        motor.drive(Direction::Forward, DUTY_MAX).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let forward = encoder.read().unwrap();
        assert!(forward > 0, "expected forward motion, got {forward}");

        motor.drive(Direction::Reverse, DUTY_MAX).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        let reversed = encoder.read().unwrap();
        assert!(reversed < forward, "expected reverse motion");
    }

    #[test]
    fn zero_duty_holds_position() {
        let sim = SimulatedAxis::default();
        let mut encoder = sim.encoder();
        let mut motor = sim.motor();

        motor.drive(Direction::Forward, 0).unwrap();
        let before = encoder.read().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(encoder.read().unwrap(), before);
    }

    #[test]
    fn reset_rebases_the_reported_frame() {
        let sim = SimulatedAxis::new(SimParams {
            start_position: 500,
            ..SimParams::default()
        });
        let mut encoder = sim.encoder();
        assert_eq!(encoder.read().unwrap(), 500);
        encoder.reset().unwrap();
        assert_eq!(encoder.read().unwrap(), 0);
        // Physical position is untouched by the reset.
        assert_eq!(sim.physical_position(), 500);
    }

    #[rstest::rstest]
    #[case(0, true)]
    #[case(25, true)]
    #[case(-25, true)]
    #[case(31, false)]
    #[case(300, false)]
    #[case(-300, false)]
    fn sensor_reads_high_only_over_the_marker(#[case] start: i64, #[case] on_marker: bool) {
        let sim = SimulatedAxis::new(SimParams {
            start_position: start,
            ..SimParams::default()
        });
        let mut sensor = sim.sensor();
        let reading = sensor.read_analog().unwrap();
        assert_eq!(reading > 2_000, on_marker, "reading {reading} at {start}");
    }

    #[test]
    fn queued_press_is_a_single_rising_edge() {
        let sim = SimulatedAxis::default();
        let mut sensor = sim.sensor();
        sim.queue_press(Button::Two);

        assert_eq!(sensor.read_button(Button::One).unwrap(), ButtonState::Released);
        assert_eq!(sensor.read_button(Button::Two).unwrap(), ButtonState::Pressed);
        assert_eq!(sensor.read_button(Button::Two).unwrap(), ButtonState::Released);
    }
}
