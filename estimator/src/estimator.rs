use std::fs::File;
use std::io::{BufRead, Read};
use std::path::Path;

use glam::DVec4;

use crate::block::{Block, BlockFlags, FeedrateProfile, Trapezoid};
use crate::dialect::{Axis, Dialect, PositioningMode, Units};
use crate::gcode::{parse_gcode, GCodeCommand, GCodeOperation, GCodeParams};
use crate::planner;
use crate::state::{Feedrates, State};

/// Simulates a firmware look-ahead motion planner over a stream of G-code and
/// reports the total time it would take to execute. See spec sections 1-7.
#[derive(Debug, Clone)]
pub struct Estimator {
    state: State,
    curr: Option<Feedrates>,
    prev: Option<Feedrates>,
    blocks: Vec<Block>,
    planned: bool,
}

impl Default for Estimator {
    fn default() -> Self {
        Estimator::from_state(State::default())
    }
}

impl Estimator {
    pub fn new() -> Estimator {
        Estimator::default()
    }

    /// Builds an estimator starting from an already-configured [`State`] (e.g.
    /// one loaded from a config file).
    pub fn from_state(state: State) -> Estimator {
        Estimator {
            state,
            curr: None,
            prev: None,
            blocks: Vec::new(),
            planned: false,
        }
    }

    /// The configuration and live cursor this estimator is using. Useful for
    /// `dump-config`-style introspection.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Restores built-in Marlin defaults, then resets.
    pub fn set_default(&mut self) {
        self.state = State::default();
        self.reset();
    }

    /// Clears the block list and accumulated time; zeroes the junction
    /// snapshots and axis positions. Kinematic limits are preserved.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.curr = None;
        self.prev = None;
        self.planned = false;
        self.state.additional_time = 0.0;
        self.state.set_position(DVec4::ZERO);
    }

    /// Feeds a single line of G-code through the dispatcher. Malformed or
    /// unsupported lines are skipped silently, per this estimator's
    /// best-effort contract.
    pub fn add_gcode_line(&mut self, line: &str) {
        if let Ok(cmd) = parse_gcode(line) {
            self.add_line(&cmd);
        }
    }

    /// Feeds an already-tokenized command through the dispatcher.
    pub fn add_line(&mut self, cmd: &GCodeCommand) {
        self.planned = false;
        let (letter, code, params) = match &cmd.op {
            GCodeOperation::Nop => return,
            GCodeOperation::Command {
                letter,
                code,
                params,
            } => (*letter, *code, params),
        };
        match (letter, code) {
            ('G', 0) | ('G', 1) => self.dispatch_move(params),
            ('G', 4) => self.dispatch_dwell(params),
            ('G', 20) => self.state.units = Units::Inches,
            ('G', 21) => self.state.units = Units::Millimeters,
            ('G', 28) => self.dispatch_home(params),
            ('G', 90) => self.state.positioning = PositioningMode::Absolute,
            ('G', 91) => self.state.positioning = PositioningMode::Relative,
            ('G', 92) => self.dispatch_set_position(params),
            ('M', 109) => self.state.additional_time += self.state.heater_wait_time,
            ('M', 104) => { /* fire-and-forget heater set, no wait modeled */ }
            ('M', 203) => self.dispatch_m203(params),
            ('M', 204) => self.dispatch_m204(params),
            ('M', 205) => self.dispatch_m205(params),
            ('M', 566) => self.dispatch_m566(params),
            _ => {}
        }
    }

    /// Feeds every line of `text` through the dispatcher and returns the total
    /// estimated time in seconds.
    pub fn calculate_time_from_text(&mut self, text: &str) -> f64 {
        for line in text.lines() {
            self.add_gcode_line(line);
        }
        self.get_time()
    }

    /// As [`Estimator::calculate_time_from_text`], reading from a file.
    pub fn calculate_time_from_file<P: AsRef<Path>>(&mut self, path: P) -> std::io::Result<f64> {
        let mut text = String::new();
        File::open(path)?.read_to_string(&mut text)?;
        Ok(self.calculate_time_from_text(&text))
    }

    /// Reads G-code lines from `reader` and feeds them through the dispatcher.
    pub fn add_from_reader<R: BufRead>(&mut self, reader: R) -> std::io::Result<()> {
        for line in reader.lines() {
            self.add_gcode_line(&line?);
        }
        Ok(())
    }

    /// Runs the look-ahead planner over any unplanned blocks. Safe to call
    /// more than once; re-planning an already-planned list is a no-op in
    /// effect (see the idempotence property test in `planner.rs`).
    pub fn finalize(&mut self) {
        if !self.planned {
            planner::plan(&mut self.blocks);
            self.planned = true;
        }
    }

    /// Total estimated execution time, in seconds.
    pub fn get_time(&mut self) -> f64 {
        self.finalize();
        self.blocks.iter().map(Block::total_time).sum::<f64>() + self.state.additional_time
    }

    /// `get_time()` formatted as `HH:MM:SS`, with unbounded hours.
    pub fn get_time_hms(&mut self) -> String {
        let total = self.get_time().max(0.0).floor() as u64;
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    // ---- configuration surface (spec section 6) ----

    pub fn set_axis_position(&mut self, axis: Axis, position: f64) {
        self.state.axis_mut(axis).position = position;
    }

    pub fn axis_position(&self, axis: Axis) -> f64 {
        self.state.axis(axis).position
    }

    pub fn set_axis_max_feedrate(&mut self, axis: Axis, feedrate: f64) {
        self.state.axis_mut(axis).max_feedrate = feedrate;
    }

    pub fn axis_max_feedrate(&self, axis: Axis) -> f64 {
        self.state.axis(axis).max_feedrate
    }

    pub fn set_axis_max_acceleration(&mut self, axis: Axis, acceleration: f64) {
        self.state.axis_mut(axis).max_acceleration = acceleration;
    }

    pub fn axis_max_acceleration(&self, axis: Axis) -> f64 {
        self.state.axis(axis).max_acceleration
    }

    pub fn set_axis_max_jerk(&mut self, axis: Axis, jerk: f64) {
        self.state.axis_mut(axis).max_jerk = jerk;
    }

    pub fn axis_max_jerk(&self, axis: Axis) -> f64 {
        self.state.axis(axis).max_jerk
    }

    pub fn set_feedrate(&mut self, feedrate_mm_sec: f64) {
        self.state.feedrate = feedrate_mm_sec;
    }

    pub fn feedrate(&self) -> f64 {
        self.state.feedrate
    }

    pub fn set_acceleration(&mut self, acceleration: f64) {
        self.state.acceleration = acceleration;
    }

    pub fn acceleration(&self) -> f64 {
        self.state.acceleration
    }

    pub fn set_minimum_feedrate(&mut self, feedrate_mm_sec: f64) {
        self.state.minimum_feedrate = feedrate_mm_sec;
    }

    pub fn minimum_feedrate(&self) -> f64 {
        self.state.minimum_feedrate
    }

    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.state.dialect = dialect;
    }

    pub fn dialect(&self) -> Dialect {
        self.state.dialect
    }

    pub fn set_units(&mut self, units: Units) {
        self.state.units = units;
    }

    pub fn units(&self) -> Units {
        self.state.units
    }

    pub fn set_positioning(&mut self, positioning: PositioningMode) {
        self.state.positioning = positioning;
    }

    pub fn positioning(&self) -> PositioningMode {
        self.state.positioning
    }

    pub fn add_additional_time(&mut self, seconds: f64) {
        self.state.additional_time += seconds;
    }

    pub fn set_additional_time(&mut self, seconds: f64) {
        self.state.additional_time = seconds;
    }

    pub fn additional_time(&self) -> f64 {
        self.state.additional_time
    }

    pub fn set_heater_wait_time(&mut self, seconds: f64) {
        self.state.heater_wait_time = seconds;
    }

    pub fn set_homing_time(&mut self, seconds: f64) {
        self.state.homing_time = seconds;
    }

    // ---- dispatch table (spec section 4.2) ----

    fn dispatch_dwell(&mut self, params: &GCodeParams) {
        if let Some(p) = params.get_number::<f64>('P') {
            self.state.additional_time += p / 1000.0;
        } else if let Some(s) = params.get_number::<f64>('S') {
            self.state.additional_time += s;
        }
    }

    fn dispatch_home(&mut self, params: &GCodeParams) {
        let any = Axis::ALL.iter().any(|a| params.has(axis_letter(*a)));
        for axis in Axis::ALL {
            if !any || params.has(axis_letter(axis)) {
                self.state.axis_mut(axis).position = 0.0;
            }
        }
        self.state.additional_time += self.state.homing_time;
    }

    fn dispatch_set_position(&mut self, params: &GCodeParams) {
        for axis in Axis::ALL {
            if let Some(v) = params.get_number::<f64>(axis_letter(axis)) {
                self.state.axis_mut(axis).position = v;
            }
        }
    }

    fn dispatch_m203(&mut self, params: &GCodeParams) {
        let divisor = if self.state.dialect.m203_is_mm_per_minute() {
            60.0
        } else {
            1.0
        };
        for axis in Axis::ALL {
            if let Some(v) = params.get_number::<f64>(axis_letter(axis)) {
                self.state.axis_mut(axis).max_feedrate = v / divisor;
            }
        }
    }

    fn dispatch_m204(&mut self, params: &GCodeParams) {
        let s = params.get_number::<f64>('S');
        let p = params.get_number::<f64>('P');
        let t = params.get_number::<f64>('T');
        match (s, p, t) {
            (Some(s), ..) => self.state.acceleration = s,
            (None, Some(p), Some(t)) => self.state.acceleration = p.min(t),
            (None, Some(p), None) => self.state.acceleration = p,
            (None, None, Some(t)) => self.state.acceleration = t,
            (None, None, None) => {}
        }
    }

    fn dispatch_m205(&mut self, params: &GCodeParams) {
        if let Some(s) = params.get_number::<f64>('S') {
            self.state.minimum_feedrate = s;
        }
        for axis in Axis::ALL {
            if let Some(v) = params.get_number::<f64>(axis_letter(axis)) {
                self.state.axis_mut(axis).max_jerk = v;
            }
        }
    }

    fn dispatch_m566(&mut self, params: &GCodeParams) {
        for axis in Axis::ALL {
            if let Some(v) = params.get_number::<f64>(axis_letter(axis)) {
                self.state.axis_mut(axis).max_jerk = v / 60.0;
            }
        }
    }

    fn dispatch_move(&mut self, params: &GCodeParams) {
        if let Some(f) = params.get_number::<f64>('F') {
            self.state.feedrate = f / 60.0;
        }

        let old_pos = self.state.position();
        let old_pos_arr = old_pos.to_array();
        let mut new_pos_arr = old_pos_arr;
        for axis in Axis::ALL {
            if let Some(v) = params.get_number::<f64>(axis_letter(axis)) {
                let v = v * self.state.units.to_mm_factor();
                new_pos_arr[axis.index()] = match self.state.positioning {
                    PositioningMode::Absolute => v,
                    PositioningMode::Relative => old_pos_arr[axis.index()] + v,
                };
            }
        }
        let new_pos = DVec4::from_array(new_pos_arr);
        self.state.set_position(new_pos);

        let delta_pos = new_pos - old_pos;
        if delta_pos == DVec4::ZERO {
            return;
        }
        self.emit_block(delta_pos);
    }

    /// Block emission, spec section 4.3 steps 1-9.
    fn emit_block(&mut self, delta_pos: DVec4) {
        let length = delta_pos.length();
        let direction = delta_pos / length;
        let delta_arr = delta_pos.to_array();

        // Step 3: cap the scalar feedrate so no axis component exceeds its
        // max_feedrate, then recompute components; apply minimum_feedrate as
        // a floor after the cap (spec's resolution of the cap/floor ordering
        // open question).
        let raw = (direction * self.state.feedrate).to_array();
        let mut ratio = 1.0;
        for axis in Axis::ALL {
            let max_fr = self.state.axis(axis).max_feedrate;
            if max_fr > 0.0 {
                let component = raw[axis.index()].abs();
                if component > max_fr {
                    ratio = ratio.min(max_fr / component);
                }
            }
        }
        let mut scalar = self.state.feedrate * ratio;
        if self.state.minimum_feedrate > 0.0 {
            scalar = scalar.max(self.state.minimum_feedrate);
        }

        // Step 4.
        let axis_feedrate = direction * scalar;
        let abs_axis_feedrate = axis_feedrate.abs();
        let axis_feedrate_arr = axis_feedrate.to_array();
        let abs_axis_feedrate_arr = abs_axis_feedrate.to_array();

        // Step 5: acceleration, reduced per axis so no axis exceeds its own
        // max_acceleration over this move.
        let mut acceleration = self.state.acceleration;
        for axis in Axis::ALL {
            let d = delta_arr[axis.index()];
            if d != 0.0 {
                let max_acc = self.state.axis(axis).max_acceleration;
                if max_acc > 0.0 {
                    acceleration = acceleration.min(max_acc * length / d.abs());
                }
            }
        }

        // Step 6: safe feedrate, the jerk-only entry/exit speed.
        let mut safe_feedrate = scalar;
        for axis in Axis::ALL {
            let jerk = self.state.axis(axis).max_jerk;
            if jerk > 0.0 {
                let component = abs_axis_feedrate_arr[axis.index()];
                if component > jerk {
                    safe_feedrate = safe_feedrate.min(scalar * jerk / component);
                }
            }
        }

        // Step 7: junction analysis against the previous block.
        let max_entry_speed = match &self.prev {
            None => safe_feedrate,
            Some(prev) => {
                let prev_axis_feedrate_arr = prev.axis_feedrate.to_array();
                let mut candidate = scalar.min(prev.feedrate);
                for axis in Axis::ALL {
                    let jerk = self.state.axis(axis).max_jerk;
                    if jerk <= 0.0 {
                        continue;
                    }
                    let jv = (axis_feedrate_arr[axis.index()] - prev_axis_feedrate_arr[axis.index()]).abs();
                    if jv > jerk {
                        candidate *= jerk / jv;
                    }
                }
                candidate.max(safe_feedrate)
            }
        };

        // Step 8: initialize the profile and flags.
        let nominal_length = scalar <= Block::max_allowable_speed(acceleration, 0.0, length);
        let block = Block {
            delta_pos,
            acceleration,
            feedrate: FeedrateProfile {
                entry: safe_feedrate,
                cruise: scalar,
                exit: safe_feedrate,
            },
            max_entry_speed,
            safe_feedrate,
            trapezoid: Trapezoid::default(),
            flags: BlockFlags {
                recalculate: true,
                nominal_length,
            },
        };

        // Step 9: append, shift snapshots.
        self.blocks.push(block);
        self.prev = self.curr;
        self.curr = Some(Feedrates {
            feedrate: scalar,
            axis_feedrate,
            abs_axis_feedrate,
            safe_feedrate,
        });
    }
}

fn axis_letter(axis: Axis) -> char {
    match axis {
        Axis::X => 'X',
        Axis::Y => 'Y',
        Axis::Z => 'Z',
        Axis::E => 'E',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_move_matches_expected_time() {
        let mut est = Estimator::new();
        est.calculate_time_from_text("G1 X100 F6000\n");
        // 100mm, entry=exit=safe=10 (jerk 10), cruise=100, a=1500 (the global
        // default: X's own max_acceleration of 9000 only bounds it from
        // above, it's never raised to it): accel/decel phases 0.06s each,
        // cruise (100 - 2*3.3)/100 = 0.934s, total 1.054s.
        let t = est.get_time();
        assert!((t - 1.054).abs() < 0.01, "got {t}");
    }

    #[test]
    fn dwell_adds_exact_time_and_no_blocks() {
        let mut est = Estimator::new();
        est.add_gcode_line("G4 P2000");
        assert_eq!(est.get_time(), 2.0);
        assert!(est.blocks().is_empty());
    }

    #[test]
    fn colinear_moves_collapse_into_one_continuous_profile() {
        let mut one = Estimator::new();
        one.add_gcode_line("G1 X100 F6000");
        let combined = one.get_time();

        let mut two = Estimator::new();
        two.add_gcode_line("G1 X50 F6000");
        two.add_gcode_line("G1 X100 F6000");
        let split = two.get_time();

        assert!((combined - split).abs() < 1e-3, "{combined} vs {split}");
    }

    #[test]
    fn right_angle_turn_bounds_corner_speed_by_jerk() {
        let mut est = Estimator::new();
        est.set_default();
        est.set_axis_max_jerk(Axis::X, 10.0);
        est.set_axis_max_jerk(Axis::Y, 10.0);
        est.add_gcode_line("G1 X10 F6000");
        est.add_gcode_line("G1 Y10 F6000");
        est.finalize();
        let blocks = est.blocks();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].feedrate.exit <= 10.0 + 1e-6);
        assert!(blocks[1].feedrate.entry <= 10.0 + 1e-6);
    }

    #[test]
    fn unit_switch_rescales_subsequent_coordinates_only() {
        let mut est = Estimator::new();
        est.add_gcode_line("G20");
        est.add_gcode_line("G1 X1 F60");
        let blocks = est.blocks();
        assert!((blocks[0].move_length() - 25.4).abs() < 1e-9);
        assert!((blocks[0].feedrate.cruise - 25.4).abs() < 1e-6);
    }

    #[test]
    fn relative_positioning_advances_cumulatively() {
        let mut est = Estimator::new();
        est.add_gcode_line("G91");
        est.add_gcode_line("G1 X10 F6000");
        est.add_gcode_line("G1 X10 F6000");
        assert_eq!(est.blocks().len(), 2);
        assert!((est.axis_position(Axis::X) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_length_move_does_not_append_a_block() {
        let mut est = Estimator::new();
        est.add_gcode_line("G1 F6000");
        assert!(est.blocks().is_empty());
    }

    #[test]
    fn get_time_hms_matches_get_time_to_the_second() {
        let mut est = Estimator::new();
        est.add_gcode_line("G4 S125");
        let secs = est.get_time();
        assert_eq!(est.get_time_hms(), "00:02:05");
        assert!((secs - 125.0).abs() < 1e-9);
    }

    #[test]
    fn chunking_independence() {
        let program = "G1 X10 F3000\nG1 Y10\nG1 X20 Y20\nG4 P500\n";
        let mut whole = Estimator::new();
        let t_whole = whole.calculate_time_from_text(program);

        let mut chunked = Estimator::new();
        for line in program.lines() {
            chunked.add_gcode_line(line);
            chunked.finalize();
        }
        let t_chunked = chunked.get_time();

        assert!((t_whole - t_chunked).abs() < 1e-6, "{t_whole} vs {t_chunked}");
    }

    #[test]
    fn doubling_limits_never_increases_the_estimate() {
        let program = "G1 X50 Y30 F6000\nG1 X10 Y80\nG1 X0 Y0\n";
        let mut baseline = Estimator::new();
        let t_base = baseline.calculate_time_from_text(program);

        let mut faster = Estimator::new();
        for axis in Axis::ALL {
            faster.set_axis_max_feedrate(axis, faster.axis_max_feedrate(axis) * 2.0);
            faster.set_axis_max_acceleration(axis, faster.axis_max_acceleration(axis) * 2.0);
        }
        let t_fast = faster.calculate_time_from_text(program);

        assert!(t_fast <= t_base + 1e-6, "{t_fast} vs {t_base}");
    }
}
