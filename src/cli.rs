use clap::Parser;

use crate::format::Width;

fn parse_width(input: &str) -> Result<Width, String> {
    match input.trim() {
        "32" => Ok(Width::Bits32),
        "64" => Ok(Width::Bits64),
        other => Err(format!("invalid width '{other}': expected 32 or 64")),
    }
}

fn parse_u64_with_hex(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex value '{input}': {e}"))
    } else {
        s.parse::<u64>()
            .map_err(|e| format!("invalid decimal value '{input}': {e}"))
    }
}

fn parse_u32_with_hex(input: &str) -> Result<u32, String> {
    let value = parse_u64_with_hex(input)?;
    u32::try_from(value).map_err(|_| format!("value '{input}' does not fit in 32 bits"))
}

/// Decode one Mach-O segment command and show how it would be annotated.
#[derive(Debug, Parser)]
#[command(name = "machseg", version)]
pub struct Args {
    /// Container holding the segment command
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Offset of the command's `cmd` word within INPUT
    #[arg(short = 'o', long = "offset", value_parser = parse_u64_with_hex, default_value = "0x20")]
    pub offset: u64,

    /// Record layout; taken from the `cmd` word when omitted
    #[arg(short = 'b', long = "bits", value_parser = parse_width)]
    pub bits: Option<Width>,

    #[arg(long = "big-endian")]
    pub big_endian: bool,

    /// Mach-O `filetype` of the image (9 = dylib stub)
    #[arg(short = 't', long = "file-type", value_parser = parse_u32_with_hex, default_value = "2")]
    pub file_type: u32,

    /// Address the image's first byte is mapped at
    #[arg(long = "base", value_parser = parse_u64_with_hex, default_value = "0")]
    pub image_base: u64,

    /// Print the annotation plan after the decoded command
    #[arg(short = 'a', long = "annotate")]
    pub annotate: bool,

    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,
}
