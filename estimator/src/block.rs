use glam::DVec4;

/// A block's velocity profile at a single stage: entry, cruise, and exit
/// speed, all mm/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedrateProfile {
    pub entry: f64,
    pub cruise: f64,
    pub exit: f64,
}

/// The accelerate/cruise/decelerate distances computed for a block, plus the
/// feedrate profile they were computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Trapezoid {
    pub distance: f64,
    pub accelerate_until: f64,
    pub decelerate_after: f64,
    pub feedrate: FeedrateProfile,
}

/// Planner bookkeeping. Purely a caching optimization over recomputing every
/// block's trapezoid on every pass; dropping these and always recomputing
/// everything would be behaviorally equivalent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockFlags {
    pub recalculate: bool,
    pub nominal_length: bool,
}

/// One planned linear move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub delta_pos: DVec4,
    pub acceleration: f64,
    pub feedrate: FeedrateProfile,
    pub max_entry_speed: f64,
    pub safe_feedrate: f64,
    pub trapezoid: Trapezoid,
    pub flags: BlockFlags,
}

impl Block {
    /// Euclidean length of the move over (X, Y, Z, E).
    pub fn move_length(&self) -> f64 {
        self.delta_pos.length()
    }

    pub fn acceleration_time(&self) -> f64 {
        self.trapezoid.acceleration_time(self.acceleration)
    }

    pub fn cruise_time(&self) -> f64 {
        self.trapezoid.cruise_time()
    }

    pub fn deceleration_time(&self) -> f64 {
        self.trapezoid.deceleration_time(self.acceleration)
    }

    pub fn cruise_distance(&self) -> f64 {
        self.trapezoid.cruise_distance()
    }

    pub fn total_time(&self) -> f64 {
        self.acceleration_time() + self.cruise_time() + self.deceleration_time()
    }

    /// Recomputes `trapezoid` from the current `feedrate` profile and
    /// `acceleration`, per spec 4.4. Guards the zero-acceleration and
    /// rounding-induced-negative-sqrt degeneracies so the result is always
    /// finite and nonnegative.
    pub fn calculate_trapezoid(&mut self) {
        let distance = self.move_length();
        let FeedrateProfile {
            entry,
            cruise,
            exit,
        } = self.feedrate;

        if self.acceleration <= 0.0 {
            self.trapezoid = Trapezoid {
                distance,
                accelerate_until: 0.0,
                decelerate_after: distance,
                feedrate: self.feedrate,
            };
            return;
        }

        let mut accelerate_until =
            Self::estimate_acceleration_distance(entry, cruise, self.acceleration);
        let decel_distance =
            Self::estimate_acceleration_distance(cruise, exit, -self.acceleration);
        let mut decelerate_after = distance - decel_distance;

        if accelerate_until > decelerate_after {
            accelerate_until = Self::intersection_distance(entry, exit, self.acceleration, distance)
                .clamp(0.0, distance);
            decelerate_after = accelerate_until;
        }

        self.trapezoid = Trapezoid {
            distance,
            accelerate_until: accelerate_until.clamp(0.0, distance),
            decelerate_after: decelerate_after.clamp(0.0, distance),
            feedrate: self.feedrate,
        };
        self.flags.recalculate = false;
    }

    /// The highest speed reachable when you must be able to reach
    /// `target_velocity` using `acceleration` within `distance`.
    pub fn max_allowable_speed(acceleration: f64, target_velocity: f64, distance: f64) -> f64 {
        let v2 = target_velocity * target_velocity + 2.0 * acceleration * distance;
        v2.max(0.0).sqrt()
    }

    /// The distance covered while accelerating (or decelerating, if
    /// `acceleration` is negative) from `initial_rate` to `target_rate`.
    pub fn estimate_acceleration_distance(
        initial_rate: f64,
        target_rate: f64,
        acceleration: f64,
    ) -> f64 {
        if acceleration == 0.0 {
            return 0.0;
        }
        (target_rate * target_rate - initial_rate * initial_rate) / (2.0 * acceleration)
    }

    /// The point at which braking must begin to go from `initial_rate` to
    /// `final_rate` over `distance`, when the trapezoid has no cruise plateau.
    pub fn intersection_distance(
        initial_rate: f64,
        final_rate: f64,
        acceleration: f64,
        distance: f64,
    ) -> f64 {
        if acceleration == 0.0 {
            return 0.0;
        }
        (2.0 * acceleration * distance - initial_rate * initial_rate + final_rate * final_rate)
            / (4.0 * acceleration)
    }
}

impl Trapezoid {
    pub fn acceleration_time(&self, acceleration: f64) -> f64 {
        Self::acceleration_time_from_distance(self.feedrate.entry, self.accelerate_until, acceleration)
    }

    pub fn cruise_distance(&self) -> f64 {
        (self.decelerate_after - self.accelerate_until).max(0.0)
    }

    pub fn cruise_time(&self) -> f64 {
        if self.feedrate.cruise <= 0.0 {
            return 0.0;
        }
        self.cruise_distance() / self.feedrate.cruise
    }

    pub fn deceleration_time(&self, acceleration: f64) -> f64 {
        let decel_distance = (self.distance - self.decelerate_after).max(0.0);
        Self::acceleration_time_from_distance(self.feedrate.exit, decel_distance, acceleration)
    }

    /// Time to accelerate from `initial_feedrate` over `distance` at `acceleration`.
    pub fn acceleration_time_from_distance(
        initial_feedrate: f64,
        distance: f64,
        acceleration: f64,
    ) -> f64 {
        if acceleration <= 0.0 {
            return 0.0;
        }
        let final_rate = Self::speed_from_distance(initial_feedrate, distance, acceleration);
        (final_rate - initial_feedrate) / acceleration
    }

    /// Final speed after accelerating from `initial_feedrate` over `distance`
    /// at `acceleration`.
    pub fn speed_from_distance(initial_feedrate: f64, distance: f64, acceleration: f64) -> f64 {
        let v2 = initial_feedrate * initial_feedrate + 2.0 * acceleration * distance;
        v2.max(0.0).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(entry: f64, cruise: f64, exit: f64, distance: f64, acceleration: f64) -> Block {
        let mut b = Block {
            delta_pos: DVec4::new(distance, 0.0, 0.0, 0.0),
            acceleration,
            feedrate: FeedrateProfile {
                entry,
                cruise,
                exit,
            },
            max_entry_speed: cruise,
            safe_feedrate: entry.min(exit),
            trapezoid: Trapezoid::default(),
            flags: BlockFlags::default(),
        };
        b.calculate_trapezoid();
        b
    }

    #[test]
    fn full_trapezoid_has_a_plateau() {
        let b = block(0.0, 100.0, 0.0, 100.0, 9000.0);
        assert!(b.trapezoid.accelerate_until < b.trapezoid.decelerate_after);
        assert!(b.trapezoid.decelerate_after <= b.trapezoid.distance + 1e-9);
        // symmetric accel/decel from and to rest
        assert!((b.acceleration_time() - b.deceleration_time()).abs() < 1e-9);
    }

    #[test]
    fn short_move_degenerates_to_triangle() {
        // Too short to ever reach cruise speed: no plateau.
        let b = block(0.0, 1000.0, 0.0, 1.0, 9000.0);
        assert!((b.trapezoid.accelerate_until - b.trapezoid.decelerate_after).abs() < 1e-9);
    }

    #[test]
    fn zero_acceleration_is_pure_cruise_not_a_panic() {
        let b = block(10.0, 10.0, 10.0, 50.0, 0.0);
        assert_eq!(b.trapezoid.accelerate_until, 0.0);
        assert_eq!(b.trapezoid.decelerate_after, b.trapezoid.distance);
        assert!(b.total_time().is_finite());
    }

    #[test]
    fn distances_never_negative_or_nan() {
        let b = block(5.0, 2.0, 1.0, 0.01, 100.0);
        assert!(b.trapezoid.accelerate_until >= 0.0);
        assert!(b.trapezoid.decelerate_after >= 0.0);
        assert!(!b.trapezoid.accelerate_until.is_nan());
        assert!(!b.trapezoid.decelerate_after.is_nan());
    }
}
