use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Инспекция каталога страничного кэша (host-сторона, вне устройства)
#[derive(Parser, Debug)]
#[command(name = "inkcache", version, about = "InkCache page cache inspection")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

fn default_root() -> PathBuf {
    std::env::var("INK_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(InkCache::consts::CACHE_DIR_DEFAULT))
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Cache totals: complete pages, bytes on disk, fs free space
    Status {
        #[arg(long, default_value_os_t = default_root())]
        root: PathBuf,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Resident pages of one book (hex id, e.g. 0007)
    Pages {
        #[arg(long, default_value_os_t = default_root())]
        root: PathBuf,
        /// Book id, 4 hex digits
        #[arg(long)]
        book: String,
        /// JSON output (array of page numbers)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Delete cached pages of one book (--book) or of all books (--all)
    Clear {
        #[arg(long, default_value_os_t = default_root())]
        root: PathBuf,
        /// Book id, 4 hex digits
        #[arg(long)]
        book: Option<String>,
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

/// Разбор book id из hex-строки вида "0007" или "0x0007".
pub fn parse_book_id(s: &str) -> anyhow::Result<u16> {
    let t = s.trim().trim_start_matches("0x");
    u16::from_str_radix(t, 16).map_err(|e| anyhow::anyhow!("bad book id {:?}: {}", s, e))
}
