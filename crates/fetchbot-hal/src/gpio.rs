//! [`GpioBus`] – pin-claim registry over the shared GPIO session.
//!
//! The bus owns the one live [`GpioChip`] session and tracks which pins are
//! claimed by which consumer. Consumers hold [`PinClaim`] tokens and pass
//! them back for every pin operation, so a released or foreign claim is
//! caught at the registry rather than corrupting the bus.
//!
//! Invariants enforced here:
//!
//! - exactly one opener: the chip is moved into the bus, and a chip backend
//!   rejects a second `open` while its session is live;
//! - a pin can be claimed by at most one owner at a time; conflicting claims
//!   fail whole, leaving no partial claim behind;
//! - `release` is idempotent — cleanup paths may run it more than once;
//! - `close` refuses while any claim is outstanding, and must be the last
//!   hardware call of the process lifetime, performed by the top-level
//!   owner, never by a subsystem.
//!
//! The underlying session is not reentrant, so concurrent hardware calls
//! must be serialised: share the bus as a [`SharedBus`] and hold the mutex
//! for the duration of each operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fetchbot_types::{PinDirection, RobotError};
use tracing::{debug, info};

/// Backend seam to the real hardware. Implementations must reject a second
/// `open` while a session is live and fail every operation after `close`.
pub trait GpioChip: Send {
    fn open(&mut self) -> Result<(), RobotError>;
    fn close(&mut self) -> Result<(), RobotError>;
    fn write(&mut self, pin: u8, level: u8) -> Result<(), RobotError>;
    fn read(&mut self, pin: u8) -> Result<u8, RobotError>;
    fn pwm(&mut self, pin: u8, freq_hz: u32, duty_pct: f32) -> Result<(), RobotError>;
}

/// Token for a set of pins claimed by one owner.
///
/// The token is handed back for every pin operation and must be released
/// (via [`GpioBus::release`]) before the handle can close. Double release
/// is a safe no-op.
#[derive(Debug)]
pub struct PinClaim {
    owner: String,
    pins: Vec<u8>,
    direction: PinDirection,
    released: bool,
}

impl PinClaim {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn pins(&self) -> &[u8] {
        &self.pins
    }

    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

struct ClaimEntry {
    owner: String,
    #[allow(dead_code)]
    direction: PinDirection,
}

/// The shared bus type: one hardware operation at a time.
pub type SharedBus = Arc<Mutex<GpioBus>>;

/// Central pin-claim registry owning the GPIO session.
pub struct GpioBus {
    chip: Box<dyn GpioChip>,
    open: bool,
    claims: HashMap<u8, ClaimEntry>,
}

impl GpioBus {
    /// Open the session on `chip` and wrap it in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HandleAlreadyOpen`] when the chip already has a
    /// live session (re-entrant open).
    pub fn open(mut chip: Box<dyn GpioChip>) -> Result<Self, RobotError> {
        chip.open()?;
        info!("gpio session opened");
        Ok(Self {
            chip,
            open: true,
            claims: HashMap::new(),
        })
    }

    /// Wrap the bus for sharing across components.
    pub fn into_shared(self) -> SharedBus {
        Arc::new(Mutex::new(self))
    }

    /// Claim `pins` for `owner` in the given direction.
    ///
    /// All-or-nothing: if any pin is already held by a different owner the
    /// whole claim fails with [`RobotError::PinConflict`] and no pin changes
    /// hands.
    pub fn claim(
        &mut self,
        owner: &str,
        pins: &[u8],
        direction: PinDirection,
    ) -> Result<PinClaim, RobotError> {
        self.ensure_open()?;
        for &pin in pins {
            if let Some(entry) = self.claims.get(&pin) {
                if entry.owner != owner {
                    return Err(RobotError::PinConflict {
                        pin,
                        owner: entry.owner.clone(),
                    });
                }
            }
        }
        for &pin in pins {
            self.claims.insert(
                pin,
                ClaimEntry {
                    owner: owner.to_string(),
                    direction,
                },
            );
        }
        debug!(owner, ?pins, ?direction, "pins claimed");
        Ok(PinClaim {
            owner: owner.to_string(),
            pins: pins.to_vec(),
            direction,
            released: false,
        })
    }

    /// Write `level` to `pin` through `claim`.
    pub fn write(&mut self, claim: &PinClaim, pin: u8, level: u8) -> Result<(), RobotError> {
        self.ensure_open()?;
        self.check_claim(claim, pin)?;
        self.chip.write(pin, level)
    }

    /// Read the level of `pin` through `claim`.
    pub fn read(&mut self, claim: &PinClaim, pin: u8) -> Result<u8, RobotError> {
        self.ensure_open()?;
        self.check_claim(claim, pin)?;
        self.chip.read(pin)
    }

    /// Drive PWM on `pin` through `claim`.
    pub fn pwm(
        &mut self,
        claim: &PinClaim,
        pin: u8,
        freq_hz: u32,
        duty_pct: f32,
    ) -> Result<(), RobotError> {
        self.ensure_open()?;
        self.check_claim(claim, pin)?;
        self.chip.pwm(pin, freq_hz, duty_pct)
    }

    /// Release every pin held by `claim`. Idempotent: releasing an
    /// already-released claim is a safe no-op.
    pub fn release(&mut self, claim: &mut PinClaim) {
        if claim.released {
            return;
        }
        for pin in &claim.pins {
            if let Some(entry) = self.claims.get(pin) {
                if entry.owner == claim.owner {
                    self.claims.remove(pin);
                }
            }
        }
        claim.released = true;
        debug!(owner = %claim.owner, pins = ?claim.pins, "pins released");
    }

    /// Number of pins still claimed.
    pub fn outstanding_claims(&self) -> usize {
        self.claims.len()
    }

    /// Close the session. Must be the last hardware call of the process.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::ResourceBusy`] while any claim is outstanding
    /// and [`RobotError::HandleClosed`] when the session already closed.
    pub fn close(&mut self) -> Result<(), RobotError> {
        self.ensure_open()?;
        if !self.claims.is_empty() {
            return Err(RobotError::ResourceBusy {
                outstanding: self.claims.len(),
            });
        }
        self.chip.close()?;
        self.open = false;
        info!("gpio session closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<(), RobotError> {
        if self.open {
            Ok(())
        } else {
            Err(RobotError::HandleClosed)
        }
    }

    fn check_claim(&self, claim: &PinClaim, pin: u8) -> Result<(), RobotError> {
        if claim.released || !claim.pins.contains(&pin) {
            return Err(RobotError::ClaimLost { pin });
        }
        match self.claims.get(&pin) {
            Some(entry) if entry.owner == claim.owner => Ok(()),
            _ => Err(RobotError::ClaimLost { pin }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimChip;

    fn open_bus() -> GpioBus {
        GpioBus::open(Box::new(SimChip::new())).unwrap()
    }

    #[test]
    fn chip_rejects_reentrant_open() {
        let mut chip = SimChip::new();
        chip.open().unwrap();
        assert_eq!(chip.open(), Err(RobotError::HandleAlreadyOpen));
    }

    #[test]
    fn claim_conflict_on_foreign_pin() {
        let mut bus = open_bus();
        let _drive = bus.claim("drive", &[13, 17], PinDirection::Output).unwrap();
        let err = bus
            .claim("ultrasonic", &[17], PinDirection::Output)
            .unwrap_err();
        assert_eq!(
            err,
            RobotError::PinConflict {
                pin: 17,
                owner: "drive".into()
            }
        );
    }

    #[test]
    fn conflicting_claim_is_all_or_nothing() {
        let mut bus = open_bus();
        let _drive = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        // Pin 2 is free but 13 is not: nothing may be claimed.
        assert!(bus.claim("ultrasonic", &[2, 13], PinDirection::Output).is_err());
        assert_eq!(bus.outstanding_claims(), 1);
        // Pin 2 must still be claimable afterwards.
        assert!(bus.claim("ultrasonic", &[2], PinDirection::Output).is_ok());
    }

    #[test]
    fn release_is_idempotent() {
        let mut bus = open_bus();
        let mut claim = bus.claim("drive", &[13, 17], PinDirection::Output).unwrap();
        bus.release(&mut claim);
        assert_eq!(bus.outstanding_claims(), 0);
        bus.release(&mut claim);
        assert_eq!(bus.outstanding_claims(), 0);
        assert!(claim.is_released());
    }

    #[test]
    fn close_fails_while_any_claim_is_outstanding() {
        let mut bus = open_bus();
        let mut a = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        let mut b = bus.claim("ultrasonic", &[2], PinDirection::Output).unwrap();

        assert_eq!(bus.close(), Err(RobotError::ResourceBusy { outstanding: 2 }));
        bus.release(&mut a);
        assert_eq!(bus.close(), Err(RobotError::ResourceBusy { outstanding: 1 }));
        bus.release(&mut b);
        assert!(bus.close().is_ok());
    }

    #[test]
    fn close_fails_regardless_of_claim_order() {
        // Same as above with the release order reversed.
        let mut bus = open_bus();
        let mut a = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        let mut b = bus.claim("ultrasonic", &[2], PinDirection::Input).unwrap();
        bus.release(&mut b);
        assert!(bus.close().is_err());
        bus.release(&mut a);
        assert!(bus.close().is_ok());
    }

    #[test]
    fn operations_after_release_report_claim_lost() {
        let mut bus = open_bus();
        let mut claim = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        bus.release(&mut claim);
        assert_eq!(
            bus.write(&claim, 13, 1),
            Err(RobotError::ClaimLost { pin: 13 })
        );
    }

    #[test]
    fn operations_on_unclaimed_pin_report_claim_lost() {
        let mut bus = open_bus();
        let claim = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        assert_eq!(
            bus.write(&claim, 14, 1),
            Err(RobotError::ClaimLost { pin: 14 })
        );
    }

    #[test]
    fn operations_after_close_report_handle_closed() {
        let mut bus = open_bus();
        let mut claim = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        bus.write(&claim, 13, 1).unwrap();
        bus.release(&mut claim);
        bus.close().unwrap();
        assert_eq!(bus.write(&claim, 13, 1), Err(RobotError::HandleClosed));
        assert_eq!(bus.close(), Err(RobotError::HandleClosed));
        assert!(!bus.is_open());
    }

    #[test]
    fn same_owner_may_reclaim_its_own_pin() {
        let mut bus = open_bus();
        let _first = bus.claim("drive", &[13], PinDirection::Output).unwrap();
        assert!(bus.claim("drive", &[13], PinDirection::Output).is_ok());
    }
}
