use anyhow::{anyhow, Result};
use std::path::PathBuf;

use InkCache::store::PageStore;

use crate::cli::parse_book_id;

pub fn exec(root: PathBuf, book: Option<String>, all: bool) -> Result<()> {
    let store = PageStore::open(&root)?;

    let deleted = match (book, all) {
        (Some(b), false) => store.clear_book(parse_book_id(&b)?)?,
        (None, true) => store.clear_all()?,
        _ => return Err(anyhow!("specify exactly one of --book or --all")),
    };

    println!("deleted {} pages", deleted);
    Ok(())
}
