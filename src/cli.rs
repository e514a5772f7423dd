use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::track::AnalysisOptions;
use crate::config::{self, AnalysisConfig, StemsConfig};
use crate::error::UsageError;
use crate::stems::ProcessSeparator;

#[derive(Parser, Debug)]
#[command(name = "mixscope", version, about = "Compare a mix against a reference track")]
pub struct Cli {
    /// Config file (default: ./mixscope.toml, then ~/.config/mixscope/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse both tracks and print their descriptors as JSON
    Compare(CompareArgs),
    /// Split a track into stems with the external separator
    Separate(SeparateArgs),
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Your mix (WAV, MP3, FLAC, OGG)
    pub mix: PathBuf,

    /// Reference track to compare against
    pub reference: PathBuf,

    /// Report descriptors that succeeded even when others fail
    #[arg(long)]
    pub partial: bool,

    /// Per-track time budget in seconds (0 = unlimited) [default: 120]
    #[arg(long)]
    pub deadline_secs: Option<f64>,

    /// Analyse on the calling thread only
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Args, Debug)]
pub struct SeparateArgs {
    /// Input audio file
    pub audio: PathBuf,

    /// Directory the stem files are written to
    pub output_dir: PathBuf,

    /// Python interpreter used to run the separator
    #[arg(long, default_value = "python3")]
    pub python: String,

    /// Separator script
    #[arg(long, default_value = "separate_stems.py")]
    pub script: PathBuf,

    /// CA bundle (PEM) passed to the separator for model downloads
    #[arg(long)]
    pub ca_bundle: Option<PathBuf>,

    /// Seconds between progress heartbeats (0 disables)
    #[arg(long, default_value_t = 2.0)]
    pub heartbeat_secs: f64,
}

impl CompareArgs {
    /// Config values apply only where the command line kept its default.
    pub fn merge_config(&mut self, cfg: &AnalysisConfig) {
        if !self.partial {
            self.partial = cfg.partial;
        }
        if !self.sequential {
            self.sequential = !cfg.parallel;
        }
        if self.deadline_secs.is_none() {
            self.deadline_secs = Some(cfg.deadline_secs);
        }
    }

    pub fn analysis_options(&self) -> Result<AnalysisOptions, UsageError> {
        let secs = self.deadline_secs.unwrap_or_else(config::default_deadline_secs);
        Ok(AnalysisOptions {
            deadline: non_negative_secs("deadline_secs", secs)?,
            parallel: !self.sequential,
        })
    }
}

impl SeparateArgs {
    pub fn merge_config(&mut self, cfg: &StemsConfig) {
        if self.python == config::default_python() {
            self.python = cfg.python.clone();
        }
        if self.script == config::default_script() {
            self.script = cfg.script.clone();
        }
        if self.ca_bundle.is_none() {
            self.ca_bundle = cfg.ca_bundle.clone();
        }
        if self.heartbeat_secs == config::default_heartbeat_secs() {
            self.heartbeat_secs = cfg.heartbeat_secs;
        }
    }

    pub fn separator(&self) -> Result<ProcessSeparator, UsageError> {
        let heartbeat =
            non_negative_secs("heartbeat_secs", self.heartbeat_secs)?.unwrap_or(Duration::ZERO);
        Ok(ProcessSeparator::new(self.python.clone(), self.script.clone())
            .with_ca_bundle(self.ca_bundle.clone())
            .with_heartbeat(heartbeat))
    }
}

/// `0` means "none".
fn non_negative_secs(name: &str, secs: f64) -> Result<Option<Duration>, UsageError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(UsageError(format!("{name} must be a non-negative number, got {secs}")));
    }
    if secs == 0.0 {
        return Ok(None);
    }
    Ok(Some(Duration::from_secs_f64(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mixscope").chain(args.iter().copied())).unwrap()
    }

    fn compare_args(args: &[&str]) -> CompareArgs {
        match parse(args).command {
            Command::Compare(c) => c,
            other => panic!("expected compare, got {other:?}"),
        }
    }

    #[test]
    fn compare_needs_both_paths() {
        assert!(Cli::try_parse_from(["mixscope", "compare", "mix.wav"]).is_err());
        let args = compare_args(&["compare", "mix.wav", "ref.wav"]);
        assert_eq!(args.mix, PathBuf::from("mix.wav"));
        assert_eq!(args.reference, PathBuf::from("ref.wav"));
    }

    #[test]
    fn defaults_give_parallel_with_two_minute_budget() {
        let options = compare_args(&["compare", "a.wav", "b.wav"]).analysis_options().unwrap();
        assert!(options.parallel);
        assert_eq!(options.deadline, Some(Duration::from_secs(120)));
    }

    #[test]
    fn config_fills_in_defaults_only() {
        let cfg = AnalysisConfig {
            deadline_secs: 30.0,
            partial: true,
            parallel: false,
        };

        let mut args = compare_args(&["compare", "a.wav", "b.wav"]);
        args.merge_config(&cfg);
        assert!(args.partial);
        assert!(args.sequential);
        assert_eq!(args.deadline_secs, Some(30.0));

        let mut args = compare_args(&["compare", "a.wav", "b.wav", "--deadline-secs", "0"]);
        args.merge_config(&cfg);
        assert_eq!(args.analysis_options().unwrap().deadline, None);
    }

    #[test]
    fn negative_deadline_is_a_usage_error() {
        let args = compare_args(&["compare", "a.wav", "b.wav", "--deadline-secs=-1"]);
        assert!(args.analysis_options().is_err());
    }

    #[test]
    fn separate_takes_stems_config() {
        let cli = parse(&["separate", "song.wav", "out", "--ca-bundle", "mine.pem"]);
        let mut args = match cli.command {
            Command::Separate(s) => s,
            other => panic!("expected separate, got {other:?}"),
        };
        args.merge_config(&StemsConfig {
            python: "/venv/bin/python".into(),
            script: PathBuf::from("/opt/separate_stems.py"),
            ca_bundle: Some(PathBuf::from("corp.pem")),
            heartbeat_secs: 5.0,
        });
        assert_eq!(args.python, "/venv/bin/python");
        assert_eq!(args.script, PathBuf::from("/opt/separate_stems.py"));
        assert_eq!(args.ca_bundle, Some(PathBuf::from("mine.pem")));
        assert_eq!(args.heartbeat_secs, 5.0);
        assert!(args.separator().is_ok());
    }
}
