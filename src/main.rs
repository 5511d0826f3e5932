mod config;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use sm83_core::cartridge::Cartridge;
use sm83_core::diagnostics::LogSink;
use sm83_core::isa::disassemble;
use sm83_core::runner::{self, CancelToken, RunLimits};
use sm83_core::{Address, GameBoy, Model};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a ROM headlessly and print the final CPU state
    Run {
        rom: PathBuf,

        /// Stop after this many M-cycles
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Stop after this many instructions
        #[arg(long)]
        max_instructions: Option<u64>,

        /// Path to boot ROM file
        #[arg(long)]
        boot_rom: Option<PathBuf>,

        /// dmg0, dmg or cgb
        #[arg(long, value_parser = parse_model)]
        model: Option<Model>,
    },
    /// Print a listing starting at an address
    Disasm {
        rom: PathBuf,

        #[arg(long, default_value = "0100", value_parser = parse_addr)]
        start: Address,

        #[arg(long, default_value_t = 32)]
        count: usize,
    },
    /// Print the cartridge header
    Header { rom: PathBuf },
}

fn parse_model(s: &str) -> Result<Model, String> {
    Model::from_name(s).ok_or_else(|| format!("unknown model '{s}'"))
}

fn parse_addr(s: &str) -> Result<Address, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix('$'))
        .unwrap_or(s);
    Address::from_str_radix(digits, 16).map_err(|e| format!("bad address '{s}': {e}"))
}

fn load_cart(path: &Path) -> Option<Cartridge> {
    match Cartridge::from_file(path, &LogSink) {
        Ok(c) => Some(c),
        Err(e) => {
            error!("Failed to load ROM {}: {e}", path.display());
            None
        }
    }
}

/// SIGINT and SIGTERM stop the run at the next instruction so save RAM is
/// still written. A second signal exits at once.
fn cancel_on_signal(token: &CancelToken) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for sig in [SIGINT, SIGTERM] {
        let registered = flag::register_conditional_shutdown(sig, 1, token.flag())
            .and_then(|_| flag::register(sig, token.flag()));
        if let Err(e) = registered {
            warn!("Failed to install handler for signal {sig}: {e}");
        }
    }
}

fn run(
    cfg: &config::Config,
    rom: PathBuf,
    limits: RunLimits,
    boot_rom: Option<PathBuf>,
    model: Model,
) -> ExitCode {
    let Some(cart) = load_cart(&rom) else {
        return ExitCode::FAILURE;
    };
    info!("Loaded \"{}\" ({:?})", cart.title, cart.mbc);

    let boot_rom = boot_rom.or_else(|| cfg.boot_rom.clone());
    let gb = match boot_rom {
        Some(path) => match std::fs::read(&path) {
            Ok(data) => GameBoy::with_boot_rom(cart, model, data),
            Err(e) => {
                error!("Failed to load boot ROM {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => GameBoy::new(cart, model),
    };
    let gb = match gb {
        Ok(gb) => gb,
        Err(e) => {
            error!("Failed to build memory map: {e}");
            return ExitCode::FAILURE;
        }
    };

    let handle = runner::spawn(gb, limits);
    cancel_on_signal(&handle.cancel_token());
    // Ends once the worker drops its sender.
    for snap in handle.snapshots().iter() {
        info!(
            "{:>10} instr {:>12} cycles  {}",
            snap.instructions,
            snap.cycles,
            snap.registers.debug_state()
        );
    }

    let (gb, result) = match handle.join() {
        Ok(r) => r,
        Err(_) => {
            error!("Emulation thread panicked");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = gb.save_ram() {
        error!("Failed to write save RAM: {e}");
    }

    match result {
        Ok(report) => {
            println!(
                "{:?} after {} instructions, {} cycles",
                report.stop, report.instructions, report.cycles
            );
            println!("{}", gb.cpu.regs.debug_state());
            ExitCode::SUCCESS
        }
        Err(fault) => {
            error!("{fault}");
            println!("{}", gb.cpu.regs.debug_state());
            ExitCode::FAILURE
        }
    }
}

fn disasm(rom: PathBuf, start: Address, count: usize) -> ExitCode {
    let Some(cart) = load_cart(&rom) else {
        return ExitCode::FAILURE;
    };
    let gb = match GameBoy::new(cart, Model::Dmg) {
        Ok(gb) => gb,
        Err(e) => {
            error!("Failed to build memory map: {e}");
            return ExitCode::FAILURE;
        }
    };
    match disassemble(&gb.mmu, start, count) {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn header(rom: PathBuf) -> ExitCode {
    let Some(cart) = load_cart(&rom) else {
        return ExitCode::FAILURE;
    };
    let header = cart.header();
    let sums = cart.checksums();
    println!("Title:      {}", header.title());
    println!("Type:       {:02X} ({:?})", header.cart_type(), cart.mbc);
    println!("ROM banks:  {}", cart.rom_banks());
    println!("RAM banks:  {}", cart.ram_banks());
    println!("Battery:    {}", header.has_battery());
    println!("Version:    {}", header.version());
    println!("Logo:       {}", if header.logo_valid() { "ok" } else { "bad" });
    println!(
        "Header sum: {:02X} (computed {:02X})",
        sums.header_stored, sums.header_computed
    );
    println!(
        "Global sum: {:04X} (computed {:04X})",
        sums.rom_stored, sums.rom_computed
    );
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let cfg_path = args.config.unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&cfg_path);

    match args.command {
        Command::Run {
            rom,
            max_cycles,
            max_instructions,
            boot_rom,
            model,
        } => {
            let mut limits = cfg.limits();
            limits.max_cycles = max_cycles.or(limits.max_cycles);
            limits.max_instructions = max_instructions.or(limits.max_instructions);
            let model = model.unwrap_or_else(|| cfg.model.into());
            run(&cfg, rom, limits, boot_rom, model)
        }
        Command::Disasm { rom, start, count } => disasm(rom, start, count),
        Command::Header { rom } => header(rom),
    }
}
