// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use vrased_areas::{LayoutConfig, MemoryLayout, RegionKind};
use vrased_monitor::properties;
use vrased_monitor::trace::{self, BinaryTraceReader, TraceFormat};
use vrased_monitor::{HardwareSignals, SecurityMonitor, TickReport};

#[derive(Debug, Parser)]
struct LayoutArgs {
    /// Memory layout (TOML); defaults to the built-in layout
    #[clap(long)]
    layout: Option<PathBuf>,
}

impl LayoutArgs {
    fn load(&self) -> Result<MemoryLayout> {
        let Some(path) = &self.layout else {
            return Ok(MemoryLayout::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read layout {}", path.display()))?;
        let cfg: LayoutConfig = toml::from_str(&text)
            .with_context(|| format!("failed to parse layout {}", path.display()))?;
        let layout = cfg
            .build()
            .with_context(|| format!("invalid layout {}", path.display()))?;
        Ok(layout)
    }
}

#[derive(Debug, Parser)]
struct TraceArgs {
    /// Signal trace (JSON, TOML or binary capture)
    trace: PathBuf,

    /// Trace format; guessed from the file extension when omitted
    #[clap(long)]
    format: Option<TraceFormat>,
}

impl TraceArgs {
    fn format(&self) -> Result<TraceFormat> {
        Ok(TraceFormat::resolve(&self.trace, self.format)?)
    }

    fn load(&self) -> Result<Vec<HardwareSignals>> {
        trace::read_trace(&self.trace, self.format)
            .with_context(|| format!("failed to load trace {}", self.trace.display()))
    }
}

#[derive(Debug, Parser)]
enum Command {
    /// Print the memory layout and its static properties
    Layout {
        #[clap(flatten)]
        layout: LayoutArgs,

        /// Only print this region (e.g. `key`, `attested-region`)
        #[arg(long, value_parser = RegionKind::from_str)]
        region: Option<RegionKind>,
    },
    /// Print the predicates for a program counter and data address
    Classify {
        #[arg(value_parser = parse_int::parse::<u32>)]
        pc: u32,

        #[arg(value_parser = parse_int::parse::<u32>)]
        data_addr: u32,

        #[clap(flatten)]
        layout: LayoutArgs,

        /// Print JSON instead of a table
        #[clap(long)]
        json: bool,
    },
    /// Run the monitor over a trace, printing one line per tick
    Replay {
        #[clap(flatten)]
        trace: TraceArgs,

        #[clap(flatten)]
        layout: LayoutArgs,

        /// Print one JSON report per line
        #[clap(long)]
        json: bool,

        /// Fail on a tick where two transition rules disagree
        #[clap(long)]
        strict: bool,
    },
    /// Check every security property over a trace
    Check {
        #[clap(short, long)]
        verbose: bool,

        #[clap(flatten)]
        trace: TraceArgs,

        #[clap(flatten)]
        layout: LayoutArgs,
    },
    /// Rewrite a trace in another format
    Convert {
        #[clap(flatten)]
        trace: TraceArgs,

        #[clap(short = 'o', long = "out")]
        dest: PathBuf,

        /// Output format; guessed from the output extension when omitted
        #[clap(long)]
        to: Option<TraceFormat>,
    },
}

#[derive(Debug, Parser)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

fn print_report(r: &TickReport) {
    let alarm = if r.global_reset {
        "RESET".red().bold()
    } else {
        "ok".green()
    };
    let rata = if r.rata_b_reset() {
        r.monitors.rata_b.state.to_string().yellow()
    } else {
        r.monitors.rata_b.state.to_string().normal()
    };
    println!(
        "{:>6} | pc {:#06x} | {:<7} | rata-b {:<12} | {}",
        r.tick, r.signals.pc, r.monitors.atomicity.state, rata, alarm
    );
}

fn replay(
    monitor: &mut SecurityMonitor,
    signals: impl Iterator<Item = Result<HardwareSignals>>,
    json: bool,
    strict: bool,
) -> Result<u64> {
    let mut resets = 0;
    for s in signals {
        let s = s?;
        let r = if strict {
            monitor.tick_strict(&s)?
        } else {
            monitor.tick(&s)
        };
        if r.global_reset {
            resets += 1;
        }
        if json {
            println!("{}", serde_json::to_string(&r)?);
        } else {
            print_report(&r);
        }
    }
    Ok(resets)
}

fn write_trace(path: &Path, format: TraceFormat, signals: &[HardwareSignals]) -> Result<()> {
    let mut out = std::io::BufWriter::new(
        std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?,
    );
    match format {
        TraceFormat::Bin => trace::write_binary(&mut out, signals)?,
        TraceFormat::Json => serde_json::to_writer_pretty(&mut out, signals)?,
        TraceFormat::Toml => {
            #[derive(serde::Serialize)]
            struct Ticks<'a> {
                tick: &'a [HardwareSignals],
            }
            out.write_all(toml::to_string(&Ticks { tick: signals })?.as_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cmd = Opts::parse();

    // Check has a custom logger; everyone else can use the default
    if !matches!(cmd.cmd, Command::Check { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cmd.cmd {
        Command::Layout { layout, region } => {
            let layout = layout.load()?;
            if let Some(kind) = region {
                let r = layout.region(kind);
                println!("{:<16} [{:#06x}, {:#06x}] ({} bytes)", kind, r.min, r.max, r.size());
                return Ok(());
            }
            for (kind, r) in layout.regions() {
                println!("{:<16} [{:#06x}, {:#06x}] ({} bytes)", kind, r.min, r.max, r.size());
            }
            println!("{:<16} {:#06x}", "reset-vector", layout.reset_address());
            println!("{:<16} {:#06x}", "after-auth-pc", layout.after_auth_pc());
            let check = |ok: bool| if ok { "yes".green() } else { "NO".red() };
            println!(
                "regions disjoint: {}",
                check(properties::region_exclusivity(&layout))
            );
            println!(
                "data regions outside ROM: {}",
                check(properties::immutability(&layout))
            );
        }
        Command::Classify {
            pc,
            data_addr,
            layout,
            json,
        } => {
            let layout = layout.load()?;
            let p = layout.classify(pc, data_addr);
            if json {
                println!("{}", serde_json::to_string_pretty(&p)?);
            } else {
                println!("pc {pc:#x}: {} of ROM", p.rom_position());
                let flags = [
                    ("key-access", p.key_access),
                    ("data-in-key", p.data_in_key),
                    ("data-in-lock-table", p.data_in_lock_table),
                    ("data-in-hmac-output", p.data_in_hmac_output),
                    ("data-in-exclusive-stack", p.data_in_exclusive_stack),
                    ("data-in-attested-region", p.data_in_attested_region),
                    ("data-in-rom", p.data_in_rom),
                    ("pc-at-reset", p.pc_at_reset),
                    ("pc-after-auth", p.pc_after_auth),
                ];
                for (name, set) in flags {
                    println!("  {name:<24} {set}");
                }
            }
        }
        Command::Replay {
            trace,
            layout,
            json,
            strict,
        } => {
            let layout = layout.load()?;
            let mut monitor = SecurityMonitor::new(&layout);
            let resets = match trace.format()? {
                // Captures can be large; stream them
                TraceFormat::Bin => {
                    let file = std::fs::File::open(&trace.trace)
                        .with_context(|| format!("failed to open {}", trace.trace.display()))?;
                    let reader = BinaryTraceReader::new(std::io::BufReader::new(file));
                    replay(
                        &mut monitor,
                        reader.map(|s| s.map_err(anyhow::Error::from)),
                        json,
                        strict,
                    )?
                }
                _ => replay(&mut monitor, trace.load()?.into_iter().map(Ok), json, strict)?,
            };
            info!("{} ticks, {} with reset asserted", monitor.ticks(), resets);
        }
        Command::Check {
            verbose,
            trace,
            layout,
        } => {
            properties::init_check_logger(verbose);
            let layout = layout.load()?;
            let signals = trace.load()?;
            properties::check_trace(&layout, &signals)?;
        }
        Command::Convert { trace, dest, to } => {
            let signals = trace.load()?;
            let format = TraceFormat::resolve(&dest, to)?;
            write_trace(&dest, format, &signals)?;
            info!("{} ticks written to {:?}", signals.len(), &dest);
        }
    }

    Ok(())
}
