//! # mxprint CLI
//!
//! Command-line interface for V5G-family thermal printers.
//!
//! ## Usage
//!
//! ```bash
//! # Check the printer
//! mxprint status
//!
//! # Print a photo with ordered dithering, extra dark
//! mxprint print-image cat.jpg --dither bayer --darkness max
//!
//! # Print a text file with a TTF font
//! mxprint print-text notes.txt --font DejaVuSans.ttf --fontsize 24
//!
//! # Write the job bytes to a file instead of printing
//! mxprint print-image cat.jpg --dump job.bin
//!
//! # Compare every dither algorithm
//! mxprint preview cat.jpg dithers.png --all
//!
//! # Serve the web interface
//! mxprint serve --listen 0.0.0.0:8080
//! ```
//!
//! The printer address comes from `--mac` or `mac_address` in `config.json`.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use mxprint::{
    config::{self, Config},
    error::{MxError, Result},
    logging,
    printer::{
        config::{parse_speed, Darkness, Speed},
        Printer,
    },
    protocol::{commands, JobSettings},
    render::{
        dither::DitheringAlgorithm,
        pipeline::{self, PipelineOptions},
        text::{self, TextOptions},
        Raster,
    },
    server::{self, ServerConfig},
    transport::RfcommLink,
};

/// mxprint - V5G thermal printer utility
#[derive(Parser, Debug)]
#[command(name = "mxprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Printer MAC address or device path. Overrides config.json
    #[arg(short, long, global = true)]
    mac: Option<String>,

    /// Configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    loglevel: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Image preparation options.
#[derive(Args, Debug)]
struct ImageArgs {
    /// Dither algorithm (defaults to config image_binarization)
    #[arg(short, long)]
    dither: Option<String>,

    /// Threshold for --dither none
    #[arg(long, default_value_t = 128)]
    threshold: u8,

    /// Counter-clockwise rotation in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotation: f32,

    /// Contrast factor (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    contrast: f32,

    /// Brightness factor (1.0 = unchanged)
    #[arg(long, default_value_t = 1.0)]
    brightness: f32,
}

/// Print job options.
#[derive(Args, Debug)]
struct JobArgs {
    /// Darkness preset (light, medium, dark, max) or 0-100
    #[arg(long, conflicts_with = "concentration")]
    darkness: Option<String>,

    /// Raw concentration / energy (0-65535)
    #[arg(short, long)]
    concentration: Option<u16>,

    /// Speed preset (fast, medium, slow) or a raw value
    #[arg(short, long)]
    speed: Option<String>,

    /// Extra lines fed after the print
    #[arg(long, default_value_t = 0)]
    feed: u16,

    /// Write the job bytes to FILE instead of printing
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an image file
    PrintImage {
        /// Image to print
        image: PathBuf,

        /// Send a pre-converted 384-wide 1-bit image without processing
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        image_args: ImageArgs,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Print a text file
    PrintText {
        /// Text file to print ("-" for stdin)
        file: PathBuf,

        /// TTF font path or file name
        #[arg(long)]
        font: Option<String>,

        /// Font size in pixels
        #[arg(long)]
        fontsize: Option<f32>,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Feed paper
    Feed {
        /// Lines to feed (defaults to config feed_lines)
        lines: Option<u16>,
    },

    /// Query the printer status
    Status,

    /// Query the printer serial number
    Serial,

    /// Run label-gap calibration
    Calibrate,

    /// Save a dithered preview as PNG without printing
    Preview {
        /// Source image
        image: PathBuf,

        /// Output PNG
        output: PathBuf,

        /// Stack every dither algorithm into one labelled image
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        image_args: ImageArgs,
    },

    /// Serve the web interface
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },

    /// Show the numeric values for a speed and darkness preset
    Settings {
        /// fast, medium or slow
        speed: String,

        /// light, medium, dark, max or 0-100
        darkness: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_create_with(config::config_path(cli.config.as_deref()), |level| {
        logging::init(cli.loglevel.as_deref(), level)
    })?;

    match cli.command {
        Commands::PrintImage {
            image,
            raw,
            image_args,
            job,
        } => {
            let source = std::fs::read(&image)?;
            let raster = if raw {
                pipeline::preprocess_raw(&source)?
            } else {
                pipeline::preprocess(&source, &image_args.options(&config))?
            };
            print(&cli.mac, &config, &raster, &job).await?;
        }

        Commands::PrintText {
            file,
            font,
            fontsize,
            job,
        } => {
            let body = read_text(&file)?;
            let options = TextOptions {
                font: font.or_else(|| config.font.clone()),
                size: fontsize.or(config.fontsize).unwrap_or(TextOptions::default().size),
                dither: config.defaults.dither(),
                ..TextOptions::default()
            };
            let raster = text::preprocess_text(&body, &options)?;
            print(&cli.mac, &config, &raster, &job).await?;
        }

        Commands::Feed { lines } => {
            let lines = lines.unwrap_or(config.defaults.feed_lines);
            let mut printer = connect(&cli.mac, &config).await?;
            let result = printer.feed(lines).await;
            finish(&mut printer, result).await?;
            println!("Fed {} lines", lines);
        }

        Commands::Status => {
            let mut printer = connect(&cli.mac, &config).await?;
            let result = printer.status().await;
            let status = finish(&mut printer, result).await?;
            println!("Status: {}", status);
            if !status.is_ready() {
                return Err(MxError::NotReady(status.to_string()));
            }
        }

        Commands::Serial => {
            let mut printer = connect(&cli.mac, &config).await?;
            let result = printer.serial_number().await;
            let serial = finish(&mut printer, result).await?;
            println!("Serial number: {}", serial);
        }

        Commands::Calibrate => {
            let mut printer = connect(&cli.mac, &config).await?;
            let result = printer.calibrate_label().await;
            let response = finish(&mut printer, result).await?;
            println!("Calibration response: {}", mxprint::transport::hex(&response));
        }

        Commands::Preview {
            image,
            output,
            all,
            image_args,
        } => {
            let source = std::fs::read(&image)?;
            let options = image_args.options(&config);
            let png = if all {
                mxprint::render::gray_to_png(&pipeline::preview_stack(&source, &options)?)?
            } else {
                pipeline::preprocess(&source, &options)?.to_png()?
            };
            std::fs::write(&output, png)?;
            println!("Saved to {}", output.display());
        }

        Commands::Serve { listen } => {
            let printer_address = config.address(cli.mac.as_deref())?;
            server::serve(ServerConfig {
                listen_addr: listen,
                printer_address,
                defaults: config.defaults.clone(),
                font: config.font.clone(),
            })
            .await?;
        }

        Commands::Settings { speed, darkness } => {
            let speed = Speed::from_name(&speed);
            let darkness = Darkness::parse(&darkness)?;
            println!("speed: {} ({})", speed.value(), speed);
            println!(
                "concentration: {} (darkness {})",
                darkness.concentration(),
                darkness.value()
            );
        }
    }

    Ok(())
}

impl ImageArgs {
    fn options(&self, config: &Config) -> PipelineOptions {
        PipelineOptions {
            dither: match &self.dither {
                Some(name) => DitheringAlgorithm::from_name(name),
                None => config.defaults.dither(),
            },
            threshold: self.threshold,
            rotation: self.rotation,
            contrast: self.contrast,
            brightness: self.brightness,
            ..PipelineOptions::default()
        }
    }
}

impl JobArgs {
    fn energy(&self, config: &Config) -> Result<u16> {
        if let Some(darkness) = &self.darkness {
            return Ok(Darkness::parse(darkness)?.concentration());
        }
        Ok(self.concentration.unwrap_or(config.defaults.concentration))
    }

    fn speed(&self, config: &Config) -> u8 {
        self.speed
            .as_deref()
            .map(parse_speed)
            .unwrap_or(config.defaults.speed)
    }
}

fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut body = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut body)?;
        return Ok(body);
    }
    Ok(std::fs::read_to_string(path)?)
}

async fn connect(mac: &Option<String>, config: &Config) -> Result<Printer<RfcommLink>> {
    let address = config.address(mac.as_deref())?;
    let mut printer = Printer::new(RfcommLink::new(), address);
    printer.connect().await?;
    Ok(printer)
}

/// Disconnect regardless of `result`, then return it.
async fn finish<T>(printer: &mut Printer<RfcommLink>, result: Result<T>) -> Result<T> {
    if let Err(e) = printer.disconnect().await {
        tracing::warn!("disconnect failed: {}", e);
    }
    result
}

/// Print `raster`, or dump its job bytes when `--dump` is given.
async fn print(mac: &Option<String>, config: &Config, raster: &Raster, job: &JobArgs) -> Result<()> {
    let energy = job.energy(config)?;
    let settings = JobSettings {
        energy,
        extra_feed: job.feed,
    };

    if let Some(path) = &job.dump {
        let frames = commands::print_job(raster, &settings)?;
        let bytes = commands::frames_to_bytes(&frames);
        std::fs::write(path, &bytes)?;
        println!(
            "Wrote {} frames ({} bytes) to {}",
            frames.len(),
            bytes.len(),
            path.display()
        );
        return Ok(());
    }

    let mut printer = connect(mac, config).await?;
    let result = printer.run_job(raster, &settings, job.speed(config)).await;
    finish(&mut printer, result).await?;

    println!("Printed {} rows", raster.height());
    Ok(())
}
