use anyhow::Result;
use std::path::PathBuf;

use InkCache::store::PageStore;

pub fn exec(root: PathBuf, json: bool) -> Result<()> {
    let store = PageStore::open(&root)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("root:         {}", root.display());
    println!("cached pages: {}", stats.cached_pages);
    println!("total bytes:  {}", stats.total_bytes);
    match stats.free_bytes {
        Some(b) => println!("fs free:      {}", b),
        None => println!("fs free:      n/a"),
    }
    Ok(())
}
