use anyhow::{bail, Context, Result};
use clap::Parser;
use emu86_core::logging::{LogCategory, LogConfig, LogLevel};
use emu86_core::loader::ImageFormat;
use emu86_core::{decode_at, disassemble, load_image, Bus, Cpu, LoadOptions, LoadedImage, StepOutcome};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "emu86", about = "Run or disassemble a 16-bit 8086 program")]
struct Args {
    /// Flat binary or MZ executable to load
    image: PathBuf,

    /// Print a listing of the loaded image instead of running it
    #[arg(long, default_value_t = false)]
    disassemble: bool,

    /// In listing mode, skip one byte after a decode error instead of stopping
    #[arg(long, default_value_t = false)]
    resync: bool,

    /// Maximum number of instructions to execute
    #[arg(long, default_value_t = 1_000_000)]
    steps: u64,

    /// Print registers and the next instruction before every step
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Size of the memory bus in KiB
    #[arg(long, default_value_t = 1024)]
    memory_kb: usize,

    /// Segment the image is loaded into (hex)
    #[arg(long, default_value = "1000", value_parser = parse_hex)]
    load_segment: u16,

    /// Offset of the first image byte within the load segment (hex)
    #[arg(long, default_value = "0100", value_parser = parse_hex)]
    origin: u16,

    /// Dump the final CPU state to this file as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Global core log level: off, error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Log level for CPU execution only
    #[arg(long)]
    log_cpu: Option<String>,

    /// Write core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Most core log messages per category per second
    #[arg(long)]
    log_rate: Option<usize>,
}

fn parse_hex(text: &str) -> Result<u16, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("'{}' is not a 16-bit hex value: {}", text, e))
}

fn parse_level(text: &str) -> Result<LogLevel> {
    match LogLevel::from_str(text) {
        Some(level) => Ok(level),
        None => bail!("unknown log level '{}'", text),
    }
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    if let Some(level) = args.log_level.as_deref() {
        config.set_global_level(parse_level(level)?);
    }
    if let Some(level) = args.log_cpu.as_deref() {
        config.set_level(LogCategory::Cpu, parse_level(level)?);
    }
    if let Some(rate) = args.log_rate {
        config.set_rate_limit(rate);
    }
    if let Some(path) = args.log_file.as_ref() {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    log::debug!(
        "core logging at {:?}, {} messages/s per category",
        config.get_global_level(),
        config.get_rate_limit()
    );
    Ok(())
}

fn hex_bytes(bus: &Bus, address: u32, len: usize) -> String {
    (0..len as u32)
        .map(|i| format!("{:02X}", bus.peek_byte(address + i)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Walk the loaded bytes in order. Offsets are relative to the segment the
/// image was placed in, so branch targets line up with the running program.
fn list(bus: &Bus, image: &LoadedImage, resync: bool) -> Result<()> {
    let (segment, base) = match image.format {
        ImageFormat::Flat => (image.cs, image.ip),
        ImageFormat::Mz => ((image.address >> 4) as u16, (image.address & 0xF) as u16),
    };

    let mut position = 0usize;
    while position < image.len {
        let address = image.address + position as u32;
        let offset = base.wrapping_add(position as u16);
        match decode_at(bus, address) {
            Ok(ins) => {
                println!(
                    "{:04X}:{:04X}  {:<18}{}",
                    segment,
                    offset,
                    hex_bytes(bus, address, ins.len()),
                    disassemble(&ins, offset)
                );
                position += ins.len();
            }
            Err(err) if resync => {
                println!(
                    "{:04X}:{:04X}  {:<18}db 0x{:02X} ; {}",
                    segment,
                    offset,
                    hex_bytes(bus, address, 1),
                    bus.peek_byte(address),
                    err
                );
                position += 1;
            }
            Err(err) => {
                bail!("{:04X}:{:04X}: {}", segment, offset, err);
            }
        }
    }
    Ok(())
}

fn save_state(cpu: &Cpu, path: &PathBuf) -> Result<()> {
    let state = cpu.save_state();
    let mut f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
    log::info!("saved CPU state to {}", path.display());
    Ok(())
}

fn run(mut cpu: Cpu, args: &Args) -> Result<()> {
    let mut executed = 0u64;
    let mut failure = None;

    while executed < args.steps {
        if args.trace {
            let next = match cpu.next_instruction() {
                Ok(ins) => disassemble(&ins, cpu.regs.ip),
                Err(err) => format!("<{}>", err),
            };
            println!("{}  {}", cpu.register_line(), next);
        }

        match cpu.step() {
            Ok(StepOutcome::Continued) => executed += 1,
            Ok(StepOutcome::Halted) => {
                log::info!("halted after {} instructions", executed);
                break;
            }
            Err(err) => {
                eprintln!(
                    "stopped at {:04X}:{:04X} [{}]: {}",
                    cpu.regs.cs,
                    cpu.regs.ip,
                    hex_bytes(&cpu.bus, cpu.pc(), 6),
                    err
                );
                failure = Some(err);
                break;
            }
        }
    }

    if executed == args.steps && !cpu.is_halted() {
        log::warn!("step limit of {} reached", args.steps);
    }

    println!("{}", cpu.register_line());

    if let Some(path) = args.save.as_ref() {
        save_state(&cpu, path)?;
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let data = fs::read(&args.image).with_context(|| format!("reading {}", args.image.display()))?;

    let mut bus = Bus::new(args.memory_kb * 1024);
    let options = LoadOptions {
        segment: args.load_segment,
        origin: args.origin,
    };
    let image = load_image(&mut bus, &data, options)
        .with_context(|| format!("loading {}", args.image.display()))?;
    log::info!(
        "{} image: {} bytes at {:05X}, entry {:04X}:{:04X}",
        match image.format {
            ImageFormat::Flat => "flat",
            ImageFormat::Mz => "MZ",
        },
        image.len,
        image.address,
        image.cs,
        image.ip
    );

    if args.disassemble {
        return list(&bus, &image, args.resync);
    }

    let mut cpu = Cpu::new(bus);
    image.apply(&mut cpu.regs);
    run(cpu, &args)
}
