//! Small stand-alone helpers shared across the control core.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::warn;

/// Wrap a deci-degree difference into the range `[-1800, 1800]`.
///
/// Used both for the compass-vs-external-heading disagreement and for the
/// heading-error / turn-rate terms in the control loop, so that a target
/// just across the 0/360 boundary from the current heading is always seen
/// as a small correction rather than a near-full-circle one.
pub fn relative_direction(diff: i32) -> i32 {
    if diff < -1800 {
        diff + 3600
    } else if diff > 1800 {
        diff - 3600
    } else {
        diff
    }
}

/// Write the current process PID to `path`, creating parent directories if needed.
pub fn write_pid_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(path)?;
    writeln!(f, "{}", std::process::id())?;
    Ok(())
}

/// Remove the PID file (best-effort, logs a warning on failure).
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("failed to remove PID file {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_direction_wraps_high_target() {
        // heading = 3599, hts = 0 -> error_correct = +1, not -3599
        assert_eq!(relative_direction(0 - 3599), 1);
    }

    #[test]
    fn relative_direction_wraps_low_heading() {
        // heading = 0, last_heading = 3599 -> turn_rate = +1
        assert_eq!(relative_direction(0 - 3599), 1);
    }

    #[test]
    fn relative_direction_is_idempotent_in_range() {
        for d in [-1800, -900, 0, 900, 1800] {
            assert_eq!(relative_direction(d), d);
        }
    }

    #[test]
    fn relative_direction_bounded() {
        for heading in (0..3600).step_by(137) {
            for target in (0..3600).step_by(211) {
                let d = relative_direction(target - heading);
                assert!(d.abs() <= 1800, "d={d} out of range for {target}-{heading}");
            }
        }
    }
}
