//! Activity classification.

use contracts::{ActivityConfig, Frame};

/// Whether a frame indicates the vehicle is in use
///
/// Speed strictly above `min_speed` or RPM strictly above zero counts as
/// active. Missing or malformed fields read as `0.0`, so a frame with
/// garbage values is inactive rather than an error.
pub fn is_active(frame: &Frame, config: &ActivityConfig) -> bool {
    let speed = frame.number(&config.speed_field);
    let rpm = frame.number(&config.rpm_field);
    speed > config.min_speed || rpm > 0.0
}
