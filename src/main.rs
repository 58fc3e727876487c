use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use variant_press::export::{self, ExportRequest, Offset};
use variant_press::imaging::{decode_rgba, encode_png, invert_lightness, read_png_dpi};
use variant_press::{classify, config, filter, output, postprocess};

#[derive(Parser)]
#[command(name = "variant-press")]
#[command(about = "Print normalization and export for design variants")]
#[command(long_about = "\
Print normalization and export for design variants

Works on local, already isolated designs (PNG, JPEG or WebP). Generation,
mockup validation and background removal need external services and are
available through the library API only.

Typical flow:

  variant-press normalize design.png print.png        # trim, fit onto the print canvas
  variant-press classify print.png                    # light or dark product?
  variant-press invert print.png print-dark.png       # retarget to the other backdrop
  variant-press export print.png final.png \\
      --canvas 2000x2000 --scale 0.5 --offset 50,0 --preset vintage

Filters use a compact syntax: \"brightness(1.2) contrast(0.8) sepia(0.3)\".

Run 'variant-press gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (TOML); stock defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Filter selection shared by commands that apply one.
#[derive(clap::Args, Clone)]
#[group(multiple = false)]
struct FilterArgs {
    /// Filter string, e.g. "brightness(1.1) sepia(0.2)"
    #[arg(long)]
    filter: Option<String>,

    /// Named filter preset (see parse-filter --presets)
    #[arg(long)]
    preset: Option<String>,
}

impl FilterArgs {
    fn resolve(&self) -> Result<filter::FilterDescriptor, Box<dyn std::error::Error>> {
        match (&self.filter, &self.preset) {
            (Some(text), _) => Ok(filter::parse(text)),
            (None, Some(name)) => filter::preset(name)
                .ok_or_else(|| format!("unknown preset '{name}'").into()),
            (None, None) => Ok(filter::FilterDescriptor::IDENTITY),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Trim and normalize a design onto the print canvas
    Normalize {
        input: PathBuf,
        output: PathBuf,
        /// Product family to normalize for (overrides print.family)
        #[arg(long)]
        family: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recommend a light or dark product backdrop for a design
    Classify {
        input: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Invert a design's lightness, keeping hue and saturation
    Invert { input: PathBuf, output: PathBuf },
    /// Composite a design onto an export canvas
    Export {
        input: PathBuf,
        output: PathBuf,
        /// Canvas size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        canvas: (u32, u32),
        /// Uniform scale applied to the design
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        /// Shift from the centered position as X,Y canvas pixels
        #[arg(long, value_parser = parse_offset, allow_hyphen_values = true, default_value = "0,0")]
        offset: Offset,
        #[command(flatten)]
        filter: FilterArgs,
        /// DPI tag for the output PNG
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Show how a filter string is interpreted
    ParseFilter {
        /// Filter string to parse
        #[arg(required_unless_present = "presets")]
        text: Option<String>,
        /// List the named presets instead
        #[arg(long)]
        presets: bool,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Normalize {
            input,
            output,
            family,
            json,
        } => {
            let mut config = config::load_config(cli.config.as_deref())?;
            if let Some(family) = family {
                config = config.with_family(&family)?;
            }
            let settings = config.postprocess_settings()?;
            let img = decode_rgba(&std::fs::read(&input)?)?;
            let design = postprocess::normalize_design(&img, &settings)?;
            std::fs::write(&output, encode_png(&design.image, Some(settings.canvas.dpi))?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&design.recommendation)?);
            } else {
                output::print_normalize_output(
                    &display(&input),
                    &display(&output),
                    &settings.canvas,
                    &design,
                );
            }
        }
        Command::Classify { input, json } => {
            let config = config::load_config(cli.config.as_deref())?;
            let img = decode_rgba(&std::fs::read(&input)?)?;
            let rec = classify::classify_with(&img, &config.classify.params());
            if json {
                println!("{}", serde_json::to_string_pretty(&rec)?);
            } else {
                output::print_classify_output(&display(&input), &rec);
            }
        }
        Command::Invert { input, output } => {
            let bytes = std::fs::read(&input)?;
            let inverted = invert_lightness(&decode_rgba(&bytes)?);
            std::fs::write(&output, encode_png(&inverted, read_png_dpi(&bytes))?)?;
            println!("{} \u{2192} {}", display(&input), display(&output));
        }
        Command::Export {
            input,
            output,
            canvas,
            scale,
            offset,
            filter,
            dpi,
        } => {
            let filter = filter.resolve()?;
            let request = ExportRequest {
                source_variant: std::fs::read(&input)?,
                filter,
                canvas_width: canvas.0,
                canvas_height: canvas.1,
                scale,
                offset,
                dpi,
            };
            std::fs::write(&output, export::export(&request)?)?;
            output::print_export_output(
                &display(&input),
                &display(&output),
                canvas.0,
                canvas.1,
                dpi,
                &filter,
            );
        }
        Command::ParseFilter { text, presets } => {
            if presets {
                for (name, text) in filter::PRESETS {
                    println!("{:<14} {}", name, text);
                }
            } else if let Some(text) = text {
                output::print_filter(&filter::parse(&text));
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber: warnings by default, debug with `-v`.
fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid dimension '{v}': {e}"))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Parse `X,Y` (either may be negative).
fn parse_offset(s: &str) -> Result<Offset, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid offset '{v}': {e}"))
    };
    Ok(Offset {
        x: parse(x)?,
        y: parse(y)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("2000x1500"), Ok((2000, 1500)));
        assert_eq!(parse_size("10X20"), Ok((10, 20)));
        assert!(parse_size("2000").is_err());
        assert!(parse_size("ax2").is_err());
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("50,0"), Ok(Offset { x: 50, y: 0 }));
        assert_eq!(parse_offset("-12, 7"), Ok(Offset { x: -12, y: 7 }));
        assert!(parse_offset("5").is_err());
    }

    #[test]
    fn export_command_parses() {
        let cli = Cli::try_parse_from([
            "variant-press",
            "export",
            "in.png",
            "out.png",
            "--canvas",
            "2000x2000",
            "--scale",
            "0.5",
            "--offset",
            "-50,0",
            "--preset",
            "noir",
        ])
        .unwrap();
        match cli.command {
            Command::Export {
                canvas,
                scale,
                offset,
                filter,
                ..
            } => {
                assert_eq!(canvas, (2000, 2000));
                assert_eq!(scale, 0.5);
                assert_eq!(offset, Offset { x: -50, y: 0 });
                assert_eq!(filter.resolve().unwrap().saturation, 0.0);
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn filter_and_preset_conflict() {
        let result = Cli::try_parse_from([
            "variant-press",
            "export",
            "in.png",
            "out.png",
            "--canvas",
            "10x10",
            "--filter",
            "sepia(1)",
            "--preset",
            "noir",
        ]);
        assert!(result.is_err());
    }
}
