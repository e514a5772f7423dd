use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;

use mixscope::analysis::{compare_files, compare_files_partial};
use mixscope::cli::{Cli, Command, CompareArgs, SeparateArgs};
use mixscope::config::{self, Config};
use mixscope::error::UsageError;
use mixscope::output;
use mixscope::stems::spawn_separation;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let text = e.to_string();
            let text = text.trim().trim_start_matches("error: ");
            let err = anyhow::Error::new(UsageError(text.to_string()));
            return report(&err);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

/// Print the error document; usage errors exit with 2, everything else with 1.
fn report(err: &anyhow::Error) -> ExitCode {
    let message = error_message(err);
    log::error!("{}", message);
    let _ = output::emit(&output::render_error(&message));
    if err.downcast_ref::<UsageError>().is_some() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

/// Join the error chain, skipping causes a parent message already quotes.
fn error_message(err: &anyhow::Error) -> String {
    let mut message = String::new();
    for cause in err.chain() {
        let text = cause.to_string();
        if message.contains(&text) {
            continue;
        }
        if !message.is_empty() {
            message.push_str(": ");
        }
        message.push_str(&text);
    }
    message
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Compare(mut args) => {
            args.merge_config(&cfg.analysis);
            compare(&args)
        }
        Command::Separate(mut args) => {
            args.merge_config(&cfg.stems);
            separate(&args)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let Some(path) = config::find_config(explicit) else {
        return Ok(Config::default());
    };
    if explicit.is_some() && !path.exists() {
        return Err(UsageError(format!("config file not found: {}", path.display())).into());
    }
    match config::load_config(&path) {
        Some(cfg) => {
            log::info!("Loaded config from {}", path.display());
            Ok(cfg)
        }
        None => {
            log::warn!("Failed to load config from {}", path.display());
            Ok(Config::default())
        }
    }
}

fn compare(args: &CompareArgs) -> Result<()> {
    let options = args.analysis_options()?;

    log::info!("mixscope - mix vs reference");
    log::info!("Mix: {}", args.mix.display());
    log::info!("Reference: {}", args.reference.display());
    match options.deadline {
        Some(d) => log::info!("Deadline: {:.0}s per track", d.as_secs_f64()),
        None => log::info!("Deadline: none"),
    }

    let document = if args.partial {
        let result = compare_files_partial(&args.mix, &args.reference, &options)?;
        output::render(&result)
    } else {
        let result = compare_files(&args.mix, &args.reference, &options)?;
        output::render(&result)
    };

    output::emit(&document).context("Failed to write result to stdout")?;
    Ok(())
}

fn separate(args: &SeparateArgs) -> Result<()> {
    let separator = args.separator()?;

    log::info!("Input: {}", args.audio.display());
    log::info!("Output: {}", args.output_dir.display());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let (progress, handle) =
        spawn_separation(separator, args.audio.clone(), args.output_dir.clone());
    for update in progress {
        pb.set_position(update.percent as u64);
        pb.set_message(format!("{} ({}s)", update.stage, update.elapsed.as_secs()));
    }

    let result = handle
        .join()
        .map_err(|_| anyhow::anyhow!("stem separation thread panicked"))?;
    match result {
        Ok(separation) => {
            pb.finish_with_message("Stem separation complete");
            log::info!("Wrote {} stems to {}", separation.stems.len(), args.output_dir.display());
            output::emit(&output::render(&separation)).context("Failed to write result to stdout")?;
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(e.into())
        }
    }
}
