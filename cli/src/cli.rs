use clap::{Args, Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use std::num::ParseIntError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "warn")]
    pub log_level: LevelFilter,

    /// Location of the settings file on disk
    #[clap(long, default_value_os_t = default_config_location())]
    pub config: PathBuf,

    /// Control transfer timeout in milliseconds, overriding the settings file
    #[clap(long)]
    pub timeout_ms: Option<u64>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every attached device
    List,

    /// Show a device's descriptors, configuration, interfaces and endpoints
    Show {
        #[clap(flatten)]
        device: DeviceAddress,
    },

    /// Read the string descriptors a device refers to
    Strings {
        #[clap(flatten)]
        device: DeviceAddress,

        /// Read only this string index
        #[clap(long, value_parser = parse_u8)]
        index: Option<u8>,
    },

    /// Perform a single control transfer on the default pipe
    Request {
        #[clap(flatten)]
        device: DeviceAddress,

        /// bmRequestType; bit 7 selects the direction
        #[clap(long, value_parser = parse_u8)]
        request_type: u8,

        /// bRequest
        #[clap(long, value_parser = parse_u8)]
        request: u8,

        /// wValue
        #[clap(long, default_value = "0", value_parser = parse_u16)]
        value: u16,

        /// wIndex
        #[clap(long, default_value = "0", value_parser = parse_u16)]
        index: u16,

        /// wLength; defaults to 0 for IN requests and to the size of --data for OUT requests
        #[clap(long, value_parser = parse_u16)]
        length: Option<u16>,

        /// Data to send, as hex (for example "80bb00")
        #[clap(long)]
        data: Option<String>,
    },

    /// List the interfaces of the current configuration
    Interfaces {
        #[clap(flatten)]
        device: DeviceAddress,

        /// Claim and release each interface in turn
        #[clap(long)]
        claim: bool,
    },
}

#[derive(Args, Debug, Copy, Clone)]
pub struct DeviceAddress {
    /// Bus the device is attached to
    #[clap(long, value_parser = parse_u8)]
    pub bus: u8,

    /// Device address on that bus
    #[clap(long, value_parser = parse_u8)]
    pub address: u8,
}

fn default_config_location() -> PathBuf {
    match ProjectDirs::from("org", "UsbDetective", "UsbDetective") {
        Some(proj_dirs) => proj_dirs.config_dir().join("settings.json"),
        None => PathBuf::from("settings.json"),
    }
}

fn parse_number(value: &str) -> Result<u64, ParseIntError> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

fn parse_u8(value: &str) -> Result<u8, String> {
    let number = parse_number(value).map_err(|e| e.to_string())?;
    u8::try_from(number).map_err(|_| format!("{} does not fit in a byte", value))
}

fn parse_u16(value: &str) -> Result<u16, String> {
    let number = parse_number(value).map_err(|e| e.to_string())?;
    u16::try_from(number).map_err(|_| format!("{} does not fit in 16 bits", value))
}

#[repr(usize)]
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}
