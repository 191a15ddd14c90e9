//! The two-pass look-ahead planner: reconciles each block's entry speed with
//! its neighbors' exit speeds subject to the acceleration budget, then
//! recomputes every block's trapezoid. See spec section 4.4.

use crate::block::Block;

/// Runs the full reverse-then-forward look-ahead over `blocks` and recomputes
/// every trapezoid. Idempotent: running it again on an already-planned list
/// leaves every block unchanged (property test in `tests/planner_invariants.rs`).
pub fn plan(blocks: &mut [Block]) {
    if blocks.is_empty() {
        return;
    }
    reverse_pass(blocks);
    forward_pass(blocks);
    recalculate_trapezoids(blocks);
}

fn reverse_pass(blocks: &mut [Block]) {
    let n = blocks.len();
    let last = &blocks[n - 1];
    let seeded = last.max_entry_speed.min(Block::max_allowable_speed(
        last.acceleration,
        last.safe_feedrate,
        last.move_length(),
    ));
    blocks[n - 1].feedrate.entry = seeded;
    blocks[n - 1].flags.recalculate = true;

    for i in (0..n - 1).rev() {
        let next_entry = blocks[i + 1].feedrate.entry;
        let curr = &mut blocks[i];
        if curr.flags.nominal_length && curr.feedrate.entry == curr.max_entry_speed {
            break;
        }
        let new_entry = curr
            .max_entry_speed
            .min(Block::max_allowable_speed(
                curr.acceleration,
                next_entry,
                curr.move_length(),
            ));
        if new_entry != curr.feedrate.entry {
            curr.feedrate.entry = new_entry;
            curr.flags.recalculate = true;
        }
    }
}

fn forward_pass(blocks: &mut [Block]) {
    let n = blocks.len();
    for i in 0..n - 1 {
        if !blocks[i].flags.nominal_length {
            let bound = Block::max_allowable_speed(
                blocks[i].acceleration,
                blocks[i].feedrate.entry,
                blocks[i].move_length(),
            );
            if bound < blocks[i + 1].feedrate.entry {
                blocks[i + 1].feedrate.entry = bound;
                blocks[i + 1].flags.recalculate = true;
            }
        }
        let entry = blocks[i + 1].feedrate.entry;
        blocks[i].feedrate.exit = entry;
    }

    let last = n - 1;
    blocks[last].feedrate.exit = blocks[last].safe_feedrate;
}

fn recalculate_trapezoids(blocks: &mut [Block]) {
    for b in blocks.iter_mut() {
        b.calculate_trapezoid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockFlags, FeedrateProfile, Trapezoid};
    use glam::DVec4;

    fn simple_block(length: f64, cruise: f64, accel: f64, safe: f64) -> Block {
        Block {
            delta_pos: DVec4::new(length, 0.0, 0.0, 0.0),
            acceleration: accel,
            feedrate: FeedrateProfile {
                entry: safe,
                cruise,
                exit: safe,
            },
            max_entry_speed: safe,
            safe_feedrate: safe,
            trapezoid: Trapezoid::default(),
            flags: BlockFlags {
                recalculate: true,
                nominal_length: cruise <= Block::max_allowable_speed(accel, 0.0, length),
            },
        }
    }

    #[test]
    fn single_block_decelerates_to_rest_at_both_ends() {
        let mut blocks = vec![simple_block(100.0, 100.0, 9000.0, 0.0)];
        plan(&mut blocks);
        assert_eq!(blocks[0].feedrate.entry, 0.0);
        assert_eq!(blocks[0].feedrate.exit, 0.0);
    }

    #[test]
    fn colinear_moves_keep_a_continuous_cruise() {
        let mut blocks = vec![
            simple_block(50.0, 100.0, 9000.0, 100.0),
            simple_block(50.0, 100.0, 9000.0, 100.0),
        ];
        plan(&mut blocks);
        assert!((blocks[0].feedrate.exit - blocks[1].feedrate.entry).abs() < 1e-9);
        assert!(blocks[0].feedrate.exit > 0.0);
    }

    #[test]
    fn planning_twice_is_idempotent() {
        let mut blocks = vec![
            simple_block(10.0, 6000.0, 500.0, 1.0),
            simple_block(20.0, 100.0, 500.0, 1.0),
            simple_block(5.0, 50.0, 500.0, 1.0),
        ];
        plan(&mut blocks);
        let once: Vec<_> = blocks.iter().map(|b| b.trapezoid).collect();
        plan(&mut blocks);
        let twice: Vec<_> = blocks.iter().map(|b| b.trapezoid).collect();
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a.accelerate_until - b.accelerate_until).abs() < 1e-6);
            assert!((a.decelerate_after - b.decelerate_after).abs() < 1e-6);
        }
    }

    #[test]
    fn invariants_hold_after_planning() {
        let mut blocks = vec![
            simple_block(10.0, 300.0, 1000.0, 10.0),
            simple_block(3.0, 300.0, 1000.0, 10.0),
            simple_block(40.0, 300.0, 1000.0, 10.0),
        ];
        plan(&mut blocks);
        for b in &blocks {
            assert!(b.feedrate.entry >= 0.0);
            assert!(b.feedrate.exit >= 0.0);
            assert!(b.feedrate.entry <= b.feedrate.cruise + 1e-9);
            assert!(b.feedrate.exit <= b.feedrate.cruise + 1e-9);
            assert!(b.trapezoid.accelerate_until <= b.trapezoid.decelerate_after + 1e-9);
            assert!(b.trapezoid.decelerate_after <= b.trapezoid.distance + 1e-9);
        }
    }
}
