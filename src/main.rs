use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches};
use console::style;
use std::path::Path;
use strum::IntoEnumIterator;

use avif2png::cli::Args;
use avif2png::image_processing::bit_depth::measure_bit_depth;
use avif2png::image_processing::convert::type_label;
use avif2png::image_processing::encode::DEFAULT_GRAY_LEVELS;
use avif2png::image_processing::report::ConversionReport;
use avif2png::image_processing::{
    convert_all, ConversionConfig, ImageType, ProgressEvent, QuantizationSpec, RunSummary,
};
use avif2png::json_output::JsonMessage;
use avif2png::utils::{
    create_progress_bar, error_println, format_duration, init_logging, status_println,
    validate_inputs, warn_println,
};

/// Print the real bit depth of a single image and exit
fn handle_check_single(path: &Path, json: bool) -> Result<()> {
    let report = measure_bit_depth(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    if json {
        JsonMessage::BitDepth {
            input_path: path.display().to_string(),
            output_path: path.display().to_string(),
            colors: report.colors,
            bits: report.bits,
        }
        .emit();
    } else {
        println!("{} {}: {}", style("[CHK_BIT]").cyan(), name, report);
    }
    Ok(())
}

fn describe_spec(spec: &QuantizationSpec, image_type: ImageType) -> String {
    match (spec.bit_depth, image_type) {
        (Some(bits), _) => format!("{} bits ({}, {})", bits, spec.method, spec.dither),
        (None, ImageType::Grayscale) => format!("{} levels (default)", DEFAULT_GRAY_LEVELS),
        (None, _) => "unmodified".to_string(),
    }
}

fn print_configuration(config: &ConversionConfig) {
    println!("{}", style("Configuration:").bold());
    println!("  Input: {}", config.input_dir.display());
    match &config.output_dir {
        Some(dir) => println!("  Output: {}", dir.display()),
        None => println!("  Output: next to sources"),
    }
    println!("  Recursive: {}", config.recursive);
    for image_type in ImageType::iter() {
        println!(
            "  {}: {}",
            type_label(Some(image_type)),
            describe_spec(config.specs.for_type(image_type), image_type)
        );
    }
    println!("  Parallel jobs: {}", config.max_workers);
    println!(
        "  Batch size: {:.1} MiB",
        config.batch_threshold as f64 / (1024.0 * 1024.0)
    );
    if config.remove_originals {
        println!("  Originals: removed after successful conversion");
    }
    println!();
}

fn print_summary(summary: &RunSummary) {
    println!("{}", style("Results Summary:").bold().green());
    println!(
        "  Conversion finished. Success: {}, Failed: {}",
        style(summary.succeeded).bold().green(),
        style(summary.failed).bold().red()
    );
    if summary.cancelled > 0 {
        println!("  Cancelled: {}", style(summary.cancelled).bold().yellow());
    }

    let count = |t: ImageType| {
        summary
            .results
            .iter()
            .filter(|r| r.succeeded && r.image_type == Some(t))
            .count()
    };
    let (gray, accent, color) = (
        count(ImageType::Grayscale),
        count(ImageType::GrayscalePlusAccent),
        count(ImageType::Color),
    );
    if gray + accent + color > 0 {
        println!();
        println!("{}", style("Image Types:").bold().blue());
        println!("  Grayscale: {}", style(gray).bold().cyan());
        println!("  Grayscale + accent: {}", style(accent).bold().magenta());
        println!("  Color: {}", style(color).bold().yellow());
    }

    if summary.failed > 0 {
        println!();
        println!("{}", style("Failed files:").bold().red());
        for result in summary.failures() {
            println!("  {}", result);
        }
    }

    println!();
    println!("Total time: {}", style(format_duration(summary.duration)).bold());
}

fn main() -> Result<()> {
    let matches = Args::command().get_matches();
    let mut args = Args::from_arg_matches(&matches)?;
    args.load_and_merge_config(&matches)?;

    init_logging(args.log, args.log_file.as_deref())?;

    if let Some(path) = &args.save_config {
        args.save_config_to(path)?;
        println!("Options saved to {}", path.display());
        return Ok(());
    }

    let json = args.json_progress;
    let quiet = args.silent || json;

    if !quiet {
        println!("{}", style("AVIF to PNG Converter").bold().blue());
        println!("{}", style("Palette-optimized batch conversion").dim());
        println!();
    }

    if let Err(e) = validate_inputs(&args) {
        if json {
            JsonMessage::error(format!("{:#}", e));
        }
        return Err(e);
    }

    if let Some(input) = args.input.as_deref().filter(|p| p.is_file()) {
        return handle_check_single(input, json);
    }

    let config = args.to_conversion_config()?;
    if let Some(path) = &args.config_file {
        status_println(quiet, &format!("Loaded options from {}", path.display()));
    }
    if !quiet {
        print_configuration(&config);
    }

    let pb = if quiet {
        None
    } else {
        let pb = create_progress_bar(0);
        pb.set_message("Converting");
        Some(pb)
    };

    let progress = |event: &ProgressEvent<'_>| {
        let result = event.result;
        if json {
            JsonMessage::progress(event.completed, event.total, result.file_name());
            JsonMessage::file_result(result);
            return;
        }
        let Some(pb) = &pb else {
            return;
        };

        pb.set_length(event.total as u64);
        pb.set_position(event.completed as u64);
        pb.set_message(result.file_name().to_string());

        if !result.succeeded {
            pb.println(format!("{} {}", style("[FAILED]").red().bold(), result));
        } else if let Some(report) = result.bit_depth {
            pb.println(format!(
                "{} {}: {}",
                style("[CHK_BIT]").cyan(),
                result.output.file_name().and_then(|n| n.to_str()).unwrap_or("unknown"),
                report
            ));
        }
    };

    let summary = match convert_all(&config, progress) {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(pb) = &pb {
                pb.abandon();
            }
            if json {
                JsonMessage::error(e.to_string());
            } else {
                error_println(&e.to_string());
            }
            return Err(e).context("Conversion aborted");
        }
    };

    if let Some(pb) = &pb {
        pb.finish_with_message("Done");
        println!();
    }

    if json {
        JsonMessage::summary(&summary);
        return Ok(());
    }

    if summary.total() == 0 && !args.silent {
        warn_println("No AVIF files found");
    }

    if args.silent {
        println!(
            "Done: {} converted, {} failed.",
            summary.succeeded, summary.failed
        );
    } else {
        print_summary(&summary);
    }

    if args.report {
        ConversionReport::from_summary(&summary).print();
    }

    Ok(())
}
