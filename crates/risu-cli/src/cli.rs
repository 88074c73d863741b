//! Argument surface, matching `original_source/risu.c`'s `getopt_long`
//! table (`setup_options`, `usage`) one option at a time.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

fn hex_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    u32::from_str_radix(s.trim_start_matches("0x").trim_start_matches("0X"), 16)
}

#[derive(Parser, Debug)]
#[command(
    name = "risu",
    about = "Run a checkpoint image in lockstep between a master and an apprentice",
    disable_help_flag = true
)]
pub struct Cli {
    /// Print help information.
    #[arg(long = "help", action = ArgAction::Help)]
    help: Option<bool>,

    /// Be the master (server); the default role is apprentice (client).
    #[arg(long)]
    pub master: bool,

    /// Record/replay a trace file instead of talking to a live peer.
    /// `-` means stdout (master) or stdin (apprentice).
    #[arg(short = 't', long = "trace", value_name = "PATH")]
    pub trace: Option<String>,

    /// Master host to connect to (apprentice only).
    #[arg(short = 'h', long = "host", default_value = "localhost")]
    pub host: String,

    /// Port to connect to/listen on.
    #[arg(short = 'p', long = "port", default_value_t = 9191)]
    pub port: u16,

    /// GPR/CR comparison mask, ppc64 only.
    #[arg(long = "ppc-ccr-mask", value_parser = hex_u32, default_value = "0xFFFFFFFF")]
    pub ppc_ccr_mask: u32,

    /// FPSCR comparison mask, ppc64 only.
    #[arg(long = "ppc-fpscr-mask", value_parser = hex_u32, default_value = "0xFFFFFFFF")]
    pub ppc_fpscr_mask: u32,

    /// Per-fpreg comparison mask, ppc64 only.
    #[arg(long = "ppc-fpregs-mask", value_parser = hex_u32, default_value = "0xFFFFFFFF")]
    pub ppc_fpregs_mask: u32,

    /// Per-vrreg comparison mask, ppc64 only.
    #[arg(long = "ppc-vrregs-mask", value_parser = hex_u32, default_value = "0xFFFFFFFF")]
    pub ppc_vrregs_mask: u32,

    /// Checkpoint image to execute.
    pub image: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_cli() {
        let cli = Cli::parse_from(["risu", "image.bin"]);
        assert!(!cli.master);
        assert_eq!(cli.port, 9191);
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.trace, None);
        assert_eq!(cli.ppc_ccr_mask, 0xFFFF_FFFF);
    }

    #[test]
    fn host_short_flag_overrides_help() {
        let cli = Cli::parse_from(["risu", "-h", "10.0.0.1", "image.bin"]);
        assert_eq!(cli.host, "10.0.0.1");
    }

    #[test]
    fn ppc_masks_accept_hex_with_or_without_prefix() {
        let cli = Cli::parse_from(["risu", "--ppc-fpscr-mask", "0x0f0f", "image.bin"]);
        assert_eq!(cli.ppc_fpscr_mask, 0x0f0f);
        let cli = Cli::parse_from(["risu", "--ppc-fpscr-mask", "0f0f", "image.bin"]);
        assert_eq!(cli.ppc_fpscr_mask, 0x0f0f);
    }

    #[test]
    fn master_flag_and_trace_path_parse() {
        let cli = Cli::parse_from(["risu", "--master", "-t", "out.trace", "image.bin"]);
        assert!(cli.master);
        assert_eq!(cli.trace.as_deref(), Some("out.trace"));
    }
}
