use std::path::PathBuf;

use clap::Parser;

use portfs::{format_image, FormatOptions};

#[derive(Parser)]
#[command(author, version, about = "Format a PortFS image")]
struct Cli {
    /// Path to the image file (created or truncated)
    image: PathBuf,

    /// Image size in bytes
    #[arg(short, long, default_value_t = 64 * 1024 * 1024)]
    size: u64,

    /// Block size in bytes
    #[arg(short, long, default_value_t = 4096)]
    block_size: u32,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let opts = FormatOptions {
        image_size_bytes: cli.size,
        block_size: cli.block_size,
    };

    if let Err(e) = format_image(&cli.image, opts) {
        log::error!("format failed: {e}");
        std::process::exit(1);
    }

    log::info!(
        "formatted {} ({} bytes, block_size={})",
        cli.image.display(),
        cli.size,
        cli.block_size
    );
}
