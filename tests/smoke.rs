use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use InkCache::cache::PageCache;
use InkCache::config::CacheConfig;
use InkCache::consts::{CHUNK_DATA_MAX, PAGE_BITMAP_SIZE};
use InkCache::metrics;
use InkCache::window::RequestSink;

#[test]
fn smoke_open_stream_read_evict() -> Result<()> {
    let root = unique_root("smoke");

    // 1) открытие кэша с захватом исходящих запросов
    let captured: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink: RequestSink = {
        let captured = captured.clone();
        Arc::new(move |frame: &[u8]| {
            captured.lock().unwrap().push(frame.to_vec());
            Ok(())
        })
    };
    let cache = PageCache::open(CacheConfig::default().with_root(root.clone()), sink)?;

    // 2) UI встаёт на страницу 0 пустой книги — уходит один запрос
    assert!(cache.update_position(0x0001, 0));
    {
        let reqs = captured.lock().unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0][0], 0x01);
        assert_eq!(LittleEndian::read_u16(&reqs[0][3..5]), 0);
    }

    // 3) линк приносит страницу 0 чанками
    let bytes = build_pattern(PAGE_BITMAP_SIZE, 0xab);
    let mut off = 0usize;
    while off < bytes.len() {
        let take = CHUNK_DATA_MAX.min(bytes.len() - off);
        cache.handle_frame(&chunk_frame(0x0001, 0, off as u32, &bytes[off..off + take]));
        off += take;
    }

    // 4) чтение обратно — байты совпадают
    let mut back = vec![0u8; PAGE_BITMAP_SIZE];
    let n = cache.read_page(0x0001, 0, &mut back)?;
    assert_eq!(n, PAGE_BITMAP_SIZE);
    assert_eq!(back, bytes);

    // Непринятая страница читается как «ещё нет»
    assert_eq!(cache.read_page(0x0001, 40, &mut back)?, 0);

    // 5) sanity статистики и метрик
    let stats = cache.stats()?;
    assert_eq!(stats.cached_pages, 1);
    assert_eq!(stats.total_bytes, PAGE_BITMAP_SIZE as u64);

    let ms = metrics::snapshot();
    assert!(ms.pages_completed >= 1);
    assert!(ms.chunks_applied >= 217);
    assert!(ms.prefetch_requests >= 1);
    Ok(())
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("inkcache-{}-{}-{}", prefix, pid, t))
}

fn chunk_frame(book_id: u16, page_num: u16, offset: u32, data: &[u8]) -> Vec<u8> {
    let mut f = vec![0u8; 17 + data.len()];
    f[0] = 0x02;
    LittleEndian::write_u16(&mut f[1..3], book_id);
    LittleEndian::write_u16(&mut f[3..5], page_num);
    LittleEndian::write_u32(&mut f[7..11], PAGE_BITMAP_SIZE as u32);
    LittleEndian::write_u32(&mut f[11..15], offset);
    LittleEndian::write_u16(&mut f[15..17], data.len() as u16);
    f[17..].copy_from_slice(data);
    f
}

fn build_pattern(len: usize, byte: u8) -> Vec<u8> {
    let mut v = vec![byte; len];
    // Немного разнообразия, чтобы не все байты были одинаковыми
    if len >= 8 {
        v[len / 2] = byte ^ 0x11;
        v[len - 1] = byte ^ 0x22;
    }
    v
}
