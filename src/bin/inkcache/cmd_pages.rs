use anyhow::Result;
use std::path::PathBuf;

use InkCache::consts::PAGE_BITMAP_SIZE;
use InkCache::store::PageStore;
use InkCache::util::parse_page_file_name;

use crate::cli::parse_book_id;

pub fn exec(root: PathBuf, book: String, json: bool) -> Result<()> {
    let book_id = parse_book_id(&book)?;
    let store = PageStore::open(&root)?;

    // Перечисление тем же способом, что store: по грамматике имён.
    let mut pages: Vec<u16> = Vec::new();
    for entry in std::fs::read_dir(store.root())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some((b, p)) = parse_page_file_name(name) else {
            continue;
        };
        if b != book_id {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) == PAGE_BITMAP_SIZE as u64 {
            pages.push(p);
        }
    }
    pages.sort_unstable();

    if json {
        println!("{}", serde_json::to_string(&pages)?);
        return Ok(());
    }

    println!("book {:04x}: {} pages", book_id, pages.len());
    if let (Some(min), Some(max)) = (store.min_page(book_id)?, store.max_page(book_id)?) {
        println!("range: {}..={}", min, max);
    }
    for p in pages {
        println!("  page {:05}", p);
    }
    Ok(())
}
