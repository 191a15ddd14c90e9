use std::fs::File;
use std::io::BufReader;

use clap::Parser;

use crate::Opts;

fn format_time(mut seconds: f64) -> String {
    let mut parts = Vec::new();

    if seconds > 3600.0 {
        parts.push(format!("{}h", (seconds / 3600.0).floor()));
        seconds %= 3600.0;
    }
    if seconds > 60.0 {
        parts.push(format!("{}m", (seconds / 60.0).floor()));
        seconds %= 60.0;
    }
    if seconds > 0.0 || parts.is_empty() {
        parts.push(format!("{seconds:.3}s"));
    }

    parts.join("")
}

#[derive(Parser, Debug)]
pub struct EstimateCmd {
    /// G-code file to read, or `-` for stdin.
    input: String,
    /// Print every planned block: distance, entry/cruise/exit speed, phase times.
    #[clap(long = "dump_moves")]
    dump_moves: bool,
    /// Print one summary line per block: entry/cruise/exit speed only.
    #[clap(long = "dump_summary")]
    dump_summary: bool,
}

impl EstimateCmd {
    pub fn run(&self, opts: &Opts) {
        let src: Box<dyn std::io::Read> = match self.input.as_str() {
            "-" => Box::new(std::io::stdin()),
            filename => Box::new(File::open(filename).expect("opening gcode file failed")),
        };

        let mut estimator = opts.make_estimator();
        estimator
            .add_from_reader(BufReader::new(src))
            .expect("reading gcode failed");

        if self.dump_moves || self.dump_summary {
            estimator.finalize();
            let width = (estimator.blocks().len() as f64).log10().ceil() as usize;
            for (i, block) in estimator.blocks().iter().enumerate() {
                if self.dump_summary {
                    println!(
                        "SUM {:width$} {:.3} / {:.3} / {:.3}",
                        i,
                        block.feedrate.entry,
                        block.feedrate.cruise,
                        block.feedrate.exit,
                        width = width,
                    );
                }
                if self.dump_moves {
                    println!(
                        "  {:width$} dist={:.3} entry={:.3} cruise={:.3} exit={:.3}",
                        i,
                        block.move_length(),
                        block.feedrate.entry,
                        block.feedrate.cruise,
                        block.feedrate.exit,
                        width = width,
                    );
                    println!(
                        "    Time: accel={:.4} cruise={:.4} decel={:.4} = {:.4}",
                        block.acceleration_time(),
                        block.cruise_time(),
                        block.deceleration_time(),
                        block.total_time(),
                    );
                }
            }
        }

        let total = estimator.get_time();
        println!("Total time: {} ({:.3}s)", format_time(total), total);
    }
}
