//! Forward-cone geometry: decides whether any target sits inside a source
//! player's warning cone and how strongly to buzz about it.
//!
//! Dual thresholds give Schmitt-style hysteresis inputs: `inside_on` uses the
//! configured cone, `inside_off` a 1.2x margin in both range and angle. The
//! registry's hold-time latch consumes both.

// ── Result ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetEval {
    pub inside_on: bool,
    pub inside_off: bool,
    /// 40..=255 when `inside_on`, else 0
    pub best_intensity: u8,
}

// ── Angle helpers ─────────────────────────────────────────────────────────────

pub fn wrap_angle_rad(mut angle_rad: f64) -> f64 {
    while angle_rad > std::f64::consts::PI {
        angle_rad -= 2.0 * std::f64::consts::PI;
    }
    while angle_rad < -std::f64::consts::PI {
        angle_rad += 2.0 * std::f64::consts::PI;
    }
    angle_rad
}

// ── Evaluation ────────────────────────────────────────────────────────────────

/// Intensity scales with closeness in range (55%) and centering in the cone
/// (45%), mapped onto 40..=255 so even a grazing hit is clearly felt.
fn intensity(distance_m: f64, dyaw_rad: f64, max_range_m: f64, cone_half_rad: f64) -> u8 {
    let range_term = (1.0 - distance_m / max_range_m).clamp(0.0, 1.0);
    let angle_term = (1.0 - dyaw_rad.abs() / cone_half_rad).clamp(0.0, 1.0);
    let score = 0.55 * range_term + 0.45 * angle_term;
    (40.0 + 215.0 * score).round() as u8
}

/// Evaluate every target position against the source's forward cone.
/// Targets closer than 1e-6 m (the source itself, degenerate overlaps)
/// are skipped.
pub fn evaluate_targets(
    src_pos: (f64, f64),
    src_yaw_deg: f64,
    target_positions: &[(f64, f64)],
    max_range_m: f64,
    cone_half_angle_deg: f64,
) -> TargetEval {
    let (sx, sy) = src_pos;
    let src_yaw_rad = src_yaw_deg.to_radians();
    let cone_half_rad = cone_half_angle_deg.to_radians();
    let cone_off_rad = cone_half_rad * 1.2;
    let range_off_m = max_range_m * 1.2;

    let mut inside_on = false;
    let mut inside_off = false;
    let mut best_intensity = 0u8;

    for &(tx, ty) in target_positions {
        let vx = tx - sx;
        let vy = ty - sy;
        let d = vx.hypot(vy);
        if d < 1e-6 {
            continue;
        }
        let bearing = vy.atan2(vx);
        let dyaw = wrap_angle_rad(src_yaw_rad - bearing);

        if d < range_off_m && dyaw.abs() < cone_off_rad {
            inside_off = true;
        }

        if d < max_range_m && dyaw.abs() < cone_half_rad {
            inside_on = true;
            best_intensity =
                best_intensity.max(intensity(d, dyaw, max_range_m, cone_half_rad));
        }
    }

    TargetEval {
        inside_on,
        inside_off,
        best_intensity,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
