use clap::Parser;
use config::{Value, ValueKind};
use gcode_time_estimator::state::State;
use once_cell::sync::OnceCell;

mod cmd;

#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"), author = "gcode-time-estimator contributors")]
pub struct Opts {
    /// Kinematic profile file (JSON5/HJSON), as produced by `dump-config`.
    #[clap(long = "config_file")]
    config_filename: Option<String>,

    /// Override a single config field, e.g. `-c acceleration=1200`.
    #[clap(short = 'c')]
    config_override: Vec<String>,

    #[clap(subcommand)]
    cmd: SubCommand,

    #[clap(skip)]
    state: OnceCell<State>,
}

impl Opts {
    fn state(&self) -> &State {
        match self.state.get() {
            Some(state) => state,
            None => match self.load_config() {
                Ok(state) => {
                    let _ = self.state.set(state);
                    self.state.get().unwrap()
                }
                Err(e) => {
                    eprintln!("Failed to load printer configuration: {e}");
                    std::process::exit(1);
                }
            },
        }
    }

    fn opt_parse(s: &str) -> anyhow::Result<(&str, Value)> {
        let eqat = match s.find('=') {
            None => anyhow::bail!("invalid config override, format key=value"),
            Some(idx) => idx,
        };
        let key = &s[..eqat];
        let raw = &s[eqat + 1..];
        let kind = if let Ok(v) = raw.parse::<f64>() {
            ValueKind::Float(v)
        } else if let Ok(v) = raw.parse::<bool>() {
            ValueKind::Boolean(v)
        } else {
            ValueKind::String(raw.to_string())
        };
        Ok((key, Value::new(None, kind)))
    }

    fn load_config(&self) -> anyhow::Result<State> {
        use config::Config;

        let mut builder = Config::builder();

        if let Some(filename) = &self.config_filename {
            builder = builder.add_source(config::File::new(filename, config::FileFormat::Json5));
        }

        let builder = self
            .config_override
            .iter()
            .try_fold(builder, |builder, opt| {
                let (k, v) = Self::opt_parse(opt)?;
                Ok::<_, anyhow::Error>(builder.set_override(k, v)?)
            })?;

        let state = builder.build()?.try_deserialize::<State>()?;
        Ok(state)
    }

    fn make_estimator(&self) -> gcode_time_estimator::Estimator {
        gcode_time_estimator::Estimator::from_state(self.state().clone())
    }
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Estimate the execution time of a G-code file (or stdin, with `-`).
    Estimate(cmd::estimate::EstimateCmd),
    /// Print the active kinematic profile as JSON.
    DumpConfig(cmd::dump_config::DumpConfigCmd),
}

impl SubCommand {
    fn run(&self, opts: &Opts) {
        match self {
            Self::Estimate(i) => i.run(opts),
            Self::DumpConfig(i) => i.run(opts),
        }
    }
}

fn main() {
    let opts = Opts::parse();
    opts.cmd.run(&opts);
}
