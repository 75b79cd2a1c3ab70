//! Per-tick state evolution and reading generation.
//!
//! Every tick runs the same steps in order:
//! 1. increment the tick counter
//! 2. flip the power flag when `tick % toggle_period == 0`
//! 3. while powered, nudge the brightness every [`BRIGHTNESS_STEP_PERIOD`] ticks
//! 4. derive the reading for the active scenario
//!
//! The toggle and brightness checks depend only on the tick counter, so they stay
//! deterministic no matter how much the wall clock drifts between ticks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::payload::{round2, ElectricalRecord, PowerState, Reading};
use super::{
    Scenario, SimulatedState, BRIGHTNESS_MAX, BRIGHTNESS_MAX_STEP, BRIGHTNESS_MIN,
    BRIGHTNESS_STEP_PERIOD, CURRENT_MAX, TEMPERATURE_MAX, VOLTAGE_FLUCTUATION, VOLTAGE_MAX,
};

/// Source of randomness for the generator.
///
/// Abstracted so tests can script exact draws.
pub trait RandomSource: Send + Sync {
    /// Uniform draw from the closed interval `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;

    /// Uniform integer draw from the closed interval `[low, high]`.
    fn step(&mut self, low: i32, high: i32) -> i32;
}

/// Entropy-seeded [`RandomSource`] used outside of tests.
pub struct SystemRandom {
    rng: StdRng,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..=high)
    }

    fn step(&mut self, low: i32, high: i32) -> i32 {
        self.rng.gen_range(low..=high)
    }
}

/// Owns the [`SimulatedState`] and turns it into one [`Reading`] per tick.
#[derive(Debug, Clone)]
pub struct Generator {
    scenario: Scenario,
    state: SimulatedState,
}

impl Generator {
    pub fn new(scenario: Scenario) -> Self {
        Self::with_state(scenario, SimulatedState::default())
    }

    pub fn with_state(scenario: Scenario, state: SimulatedState) -> Self {
        Self { scenario, state }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn state(&self) -> &SimulatedState {
        &self.state
    }

    /// Advances the state by one tick and computes the reading for it.
    pub fn advance<R: RandomSource + ?Sized>(&mut self, random: &mut R) -> Reading {
        self.state.tick += 1;

        if self.state.tick % self.scenario.toggle_period() == 0 {
            self.state.power = !self.state.power;
        }

        if self.state.power && self.state.tick % BRIGHTNESS_STEP_PERIOD == 0 {
            let delta = random.step(-BRIGHTNESS_MAX_STEP, BRIGHTNESS_MAX_STEP);
            self.state.brightness = adjust_brightness(self.state.brightness, delta);
        }

        match self.scenario {
            Scenario::Temperature => {
                let celsius = random.uniform(0.0, TEMPERATURE_MAX).clamp(0.0, TEMPERATURE_MAX);
                Reading::Temperature(round2(celsius))
            }
            Scenario::Electrical => Reading::Electrical(self.electrical(random)),
            Scenario::Brightness => Reading::Lamp {
                voltage: self.lamp_voltage(random),
                brightness: self.state.brightness,
                power: self.state.power.into(),
            },
        }
    }

    fn electrical<R: RandomSource + ?Sized>(&self, random: &mut R) -> ElectricalRecord {
        if !self.state.power {
            return ElectricalRecord {
                power: PowerState::Off,
                voltage: 0.0,
                current: 0.0,
                watt: 0.0,
            };
        }

        let voltage = random.uniform(0.0, VOLTAGE_MAX).clamp(0.0, VOLTAGE_MAX);
        let current = random.uniform(0.0, CURRENT_MAX).clamp(0.0, CURRENT_MAX);
        ElectricalRecord {
            power: PowerState::On,
            voltage: round2(voltage),
            current: round2(current),
            watt: round2(voltage * current / 1000.0),
        }
    }

    fn lamp_voltage<R: RandomSource + ?Sized>(&self, random: &mut R) -> f64 {
        if !self.state.power {
            return 0.0;
        }

        let base = f64::from(self.state.brightness) / 100.0 * VOLTAGE_MAX;
        let fluctuation = random.uniform(-VOLTAGE_FLUCTUATION, VOLTAGE_FLUCTUATION);
        round2((base * (1.0 + fluctuation)).clamp(0.0, VOLTAGE_MAX))
    }
}

/// Applies a brightness delta, keeping the result inside the dimmer's range.
pub fn adjust_brightness(current: i32, delta: i32) -> i32 {
    let delta = delta.clamp(-BRIGHTNESS_MAX_STEP, BRIGHTNESS_MAX_STEP);
    (current + delta).clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays queued draws; falls back to the midpoint / zero step once exhausted.
    #[derive(Default)]
    pub(crate) struct ScriptedRandom {
        uniforms: VecDeque<f64>,
        steps: VecDeque<i32>,
    }

    impl ScriptedRandom {
        pub(crate) fn uniforms(values: &[f64]) -> Self {
            Self {
                uniforms: values.iter().copied().collect(),
                steps: VecDeque::new(),
            }
        }

        pub(crate) fn with_steps(mut self, steps: &[i32]) -> Self {
            self.steps = steps.iter().copied().collect();
            self
        }
    }

    impl RandomSource for ScriptedRandom {
        fn uniform(&mut self, low: f64, high: f64) -> f64 {
            self.uniforms.pop_front().unwrap_or((low + high) / 2.0)
        }

        fn step(&mut self, _low: i32, _high: i32) -> i32 {
            self.steps.pop_front().unwrap_or(0)
        }
    }

    #[test]
    fn temperature_first_tick_rounds_to_two_decimals() {
        let mut generator = Generator::new(Scenario::Temperature);
        let mut random = ScriptedRandom::uniforms(&[37.456]);

        let reading = generator.advance(&mut random);

        assert_eq!(generator.state().tick, 1);
        assert_eq!(reading.to_payload().unwrap(), "37.46");
    }

    #[test]
    fn electrical_watt_is_derived_from_voltage_and_current() {
        let mut generator = Generator::new(Scenario::Electrical);
        let mut random = ScriptedRandom::uniforms(&[110.0, 2.0]);

        let payload = generator.advance(&mut random).to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["watt"], 0.22);
        assert_eq!(value["voltage"], 110.0);
        assert_eq!(value["current"], 2.0);
        assert_eq!(value["power"], "on");
    }

    #[test]
    fn lamp_at_half_brightness_without_fluctuation() {
        let state = SimulatedState {
            tick: 0,
            power: true,
            brightness: 50,
        };
        let mut generator = Generator::with_state(Scenario::Brightness, state);
        let mut random = ScriptedRandom::uniforms(&[0.0]);

        let reading = generator.advance(&mut random);

        assert_eq!(reading.to_payload().unwrap(), "110.0");
    }

    #[test]
    fn power_toggles_only_on_multiples_of_the_period() {
        for scenario in [Scenario::Temperature, Scenario::Electrical, Scenario::Brightness] {
            let period = scenario.toggle_period();
            let mut generator = Generator::new(scenario);
            let mut random = SystemRandom::seeded(7);
            let mut previous = generator.state().power;

            for _ in 0..(period * 6) {
                generator.advance(&mut random);
                let state = generator.state();
                let flipped = state.power != previous;
                assert_eq!(flipped, state.tick % period == 0, "tick {}", state.tick);
                previous = state.power;
            }
        }
    }

    #[test]
    fn brightness_stays_in_range_for_every_delta() {
        for start in BRIGHTNESS_MIN..=BRIGHTNESS_MAX {
            for delta in -BRIGHTNESS_MAX_STEP..=BRIGHTNESS_MAX_STEP {
                let adjusted = adjust_brightness(start, delta);
                assert!((BRIGHTNESS_MIN..=BRIGHTNESS_MAX).contains(&adjusted));
            }
        }
    }

    #[test]
    fn brightness_only_moves_on_powered_step_ticks() {
        let mut generator = Generator::new(Scenario::Brightness);
        let mut random = ScriptedRandom::default().with_steps(&[-10; 8]);

        for _ in 0..40 {
            let before = generator.state().brightness;
            generator.advance(&mut random);
            let state = generator.state();
            if state.brightness != before {
                assert!(state.power);
                assert_eq!(state.tick % BRIGHTNESS_STEP_PERIOD, 0);
            }
            assert!((BRIGHTNESS_MIN..=BRIGHTNESS_MAX).contains(&state.brightness));
        }
        // three steps before the power drops at tick 20, one more once it is back at tick 40
        assert_eq!(generator.state().brightness, 60);
    }

    #[test]
    fn readings_stay_within_physical_bounds() {
        let mut electrical = Generator::new(Scenario::Electrical);
        let mut lamp = Generator::new(Scenario::Brightness);
        let mut random = SystemRandom::seeded(42);

        for _ in 0..500 {
            match electrical.advance(&mut random) {
                Reading::Electrical(record) => {
                    assert!((0.0..=VOLTAGE_MAX).contains(&record.voltage));
                    assert!((0.0..=CURRENT_MAX).contains(&record.current));
                    if record.power == PowerState::Off {
                        assert_eq!(record.voltage, 0.0);
                    }
                }
                other => panic!("unexpected reading {:?}", other),
            }

            match lamp.advance(&mut random) {
                Reading::Lamp { voltage, power, .. } => {
                    assert!((0.0..=VOLTAGE_MAX).contains(&voltage));
                    if power == PowerState::Off {
                        assert_eq!(voltage, 0.0);
                    }
                }
                other => panic!("unexpected reading {:?}", other),
            }
        }
    }

    #[test]
    fn lamp_is_dark_when_power_is_off() {
        let state = SimulatedState {
            tick: Scenario::Brightness.toggle_period() - 1,
            power: true,
            brightness: 80,
        };
        let mut generator = Generator::with_state(Scenario::Brightness, state);
        let mut random = ScriptedRandom::uniforms(&[0.02]);

        let reading = generator.advance(&mut random);

        assert!(!generator.state().power);
        assert_eq!(reading.to_payload().unwrap(), "0.0");
    }
}
