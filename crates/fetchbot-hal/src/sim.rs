//! Simulated backends for running and testing without hardware.
//!
//! [`SimChip`] records every GPIO operation and plays back scripted read
//! levels, so tests can assert on the exact hardware call sequence.
//! [`SimFrameSource`] hands out blank frames at a configured size.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use fetchbot_types::{Frame, RobotError};

use crate::camera::FrameSource;
use crate::gpio::GpioChip;

/// One recorded hardware call.
#[derive(Debug, Clone, PartialEq)]
pub enum SimOp {
    Open,
    Close,
    Write { pin: u8, level: u8 },
    Read { pin: u8 },
    Pwm { pin: u8, freq_hz: u32, duty_pct: f32 },
}

/// Observable state of a [`SimChip`], shared with the test that built it.
#[derive(Debug, Default)]
pub struct SimState {
    pub open: bool,
    pub levels: HashMap<u8, u8>,
    pub pwm: HashMap<u8, (u32, f32)>,
    pub ops: Vec<SimOp>,
    pub read_script: HashMap<u8, VecDeque<u8>>,
}

/// In-memory chip backend. Reads pop the scripted levels for the pin first,
/// then fall back to the last written level, then 0.
pub struct SimChip {
    state: Arc<Mutex<SimState>>,
}

impl SimChip {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Handle to the shared state, kept by tests after the chip moves into
    /// the bus.
    pub fn state(&self) -> Arc<Mutex<SimState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioChip for SimChip {
    fn open(&mut self) -> Result<(), RobotError> {
        let mut st = self.lock();
        if st.open {
            return Err(RobotError::HandleAlreadyOpen);
        }
        st.open = true;
        st.ops.push(SimOp::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<(), RobotError> {
        let mut st = self.lock();
        if !st.open {
            return Err(RobotError::HandleClosed);
        }
        st.open = false;
        st.ops.push(SimOp::Close);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: u8) -> Result<(), RobotError> {
        let mut st = self.lock();
        if !st.open {
            return Err(RobotError::HandleClosed);
        }
        st.levels.insert(pin, level);
        st.ops.push(SimOp::Write { pin, level });
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<u8, RobotError> {
        let mut st = self.lock();
        if !st.open {
            return Err(RobotError::HandleClosed);
        }
        st.ops.push(SimOp::Read { pin });
        if let Some(script) = st.read_script.get_mut(&pin) {
            if let Some(level) = script.pop_front() {
                return Ok(level);
            }
        }
        Ok(st.levels.get(&pin).copied().unwrap_or(0))
    }

    fn pwm(&mut self, pin: u8, freq_hz: u32, duty_pct: f32) -> Result<(), RobotError> {
        let mut st = self.lock();
        if !st.open {
            return Err(RobotError::HandleClosed);
        }
        st.pwm.insert(pin, (freq_hz, duty_pct));
        st.ops.push(SimOp::Pwm { pin, freq_hz, duty_pct });
        Ok(())
    }
}

/// Frame source that returns blank frames of a fixed size.
pub struct SimFrameSource {
    width: u32,
    height: u32,
}

impl SimFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameSource for SimFrameSource {
    fn get_frame(&mut self) -> Result<Option<Frame>, RobotError> {
        Ok(Some(Frame {
            width: self.width,
            height: self.height,
            data: vec![0; (self.width * self.height) as usize],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_prefers_script_then_last_write() {
        let mut chip = SimChip::new();
        let state = chip.state();
        chip.open().unwrap();
        state
            .lock()
            .unwrap()
            .read_script
            .insert(15, VecDeque::from([1, 0]));
        chip.write(15, 1).unwrap();
        assert_eq!(chip.read(15).unwrap(), 1);
        assert_eq!(chip.read(15).unwrap(), 0);
        // Script drained: fall back to the written level.
        assert_eq!(chip.read(15).unwrap(), 1);
        assert_eq!(chip.read(99).unwrap(), 0);
    }

    #[test]
    fn close_is_recorded_as_last_op() {
        let mut chip = SimChip::new();
        let state = chip.state();
        chip.open().unwrap();
        chip.write(13, 1).unwrap();
        chip.close().unwrap();
        let st = state.lock().unwrap();
        assert_eq!(st.ops.last(), Some(&SimOp::Close));
        assert!(!st.open);
    }

    #[test]
    fn sim_frames_match_configured_size() {
        let mut cam = SimFrameSource::new(640, 480);
        let frame = cam.get_frame().unwrap().unwrap();
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        assert_eq!(frame.data.len(), 640 * 480);
    }
}
