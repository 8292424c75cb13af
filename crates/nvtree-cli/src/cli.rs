use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nvtree_types::BackendKind;

#[derive(Parser)]
#[command(
    name = "nvtree",
    about = "Inspect and edit nvtree item-tree images",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Host file holding the device image.
    #[arg(long, global = true, default_value = "nvtree.img")]
    pub image: PathBuf,

    /// Device kind the image file stands for (nor, sflash, ram).
    #[arg(long, global = true, default_value = "ram")]
    pub backend: BackendKind,

    #[arg(long, global = true, default_value = "0")]
    pub unit: u32,

    /// Size of a newly created image file.
    #[arg(long, global = true, default_value = "4194304")]
    pub capacity: u32,

    /// Session configuration (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Erase the image region and write an empty tree
    Init,
    /// Print the tree, or the subtree at a path
    Print(PathArgs),
    /// Show one value
    Get(GetArgs),
    /// Create or update a value, creating missing groups on the way
    Set(SetArgs),
    /// Create a group path
    Mkdir(GetArgs),
    /// Delete an item and everything below it
    Del(GetArgs),
    /// Erase the image region
    Erase,
    /// Look a value up without loading the tree
    LiteGet(GetArgs),
    /// Patch a value in place without loading the tree
    LiteSet(SetArgs),
    /// Show image and budget figures
    Info,
    /// Re-save the image encrypted under a key class, or in the clear with "off"
    Secure(SecureArgs),
}

#[derive(Args)]
pub struct PathArgs {
    pub path: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub path: String,
    /// Tagged value: u8:N, u16:N, u32:N, hex:..., text:..., or plain text.
    pub value: String,
}

#[derive(Args)]
pub struct SecureArgs {
    /// root, kcp, kpicv or off
    pub class: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["nvtree", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
        assert_eq!(cli.image, PathBuf::from("nvtree.img"));
        assert_eq!(cli.backend, BackendKind::Ram);
    }

    #[test]
    fn parse_print_subtree() {
        let cli = Cli::try_parse_from(["nvtree", "print", "net.if0"]).unwrap();
        if let Command::Print(args) = cli.command {
            assert_eq!(args.path, Some("net.if0".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_set() {
        let cli = Cli::try_parse_from(["nvtree", "set", "net.mtu", "u16:1500"]).unwrap();
        if let Command::Set(args) = cli.command {
            assert_eq!(args.path, "net.mtu");
            assert_eq!(args.value, "u16:1500");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_lite_get() {
        let cli = Cli::try_parse_from(["nvtree", "lite-get", "boot.args"]).unwrap();
        assert!(matches!(cli.command, Command::LiteGet(_)));
    }

    #[test]
    fn parse_backend_and_image() {
        let cli = Cli::try_parse_from([
            "nvtree", "info", "--backend", "sflash", "--image", "/tmp/dump.bin", "--unit", "1",
        ])
        .unwrap();
        assert_eq!(cli.backend, BackendKind::SerialFlash);
        assert_eq!(cli.image, PathBuf::from("/tmp/dump.bin"));
        assert_eq!(cli.unit, 1);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["nvtree", "--backend", "tape", "info"]).is_err());
    }

    #[test]
    fn parse_secure() {
        let cli = Cli::try_parse_from(["nvtree", "secure", "kcp"]).unwrap();
        if let Command::Secure(args) = cli.command {
            assert_eq!(args.class, "kcp");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["nvtree", "--verbose", "init"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["nvtree", "--format", "json", "print"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
