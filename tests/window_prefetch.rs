use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use InkCache::config::CacheConfig;
use InkCache::consts::PAGE_BITMAP_SIZE;
use InkCache::store::PageStore;
use InkCache::util::page_file_name;
use InkCache::window::{RequestSink, WindowController};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("inkcache-{}-{}-{}", prefix, pid, t))
}

fn put_page(root: &PathBuf, book: u16, page: u16) {
    fs::create_dir_all(root).unwrap();
    fs::write(
        root.join(page_file_name(book, page)),
        vec![0u8; PAGE_BITMAP_SIZE],
    )
    .unwrap();
}

/// Sink, складывающий разобранные Request-кадры в вектор.
fn capture_sink(captured: Arc<Mutex<Vec<(u16, u16, u8)>>>) -> RequestSink {
    Arc::new(move |frame: &[u8]| {
        assert_eq!(frame.len(), 8);
        assert_eq!(frame[0], 0x01);
        let book = LittleEndian::read_u16(&frame[1..3]);
        let start = LittleEndian::read_u16(&frame[3..5]);
        let count = frame[5];
        captured.lock().unwrap().push((book, start, count));
        Ok(())
    })
}

fn test_config(root: &PathBuf) -> CacheConfig {
    CacheConfig::default()
        .with_root(root.clone())
        .with_window(2, 5)
        .with_retention(5, 5)
        .with_request_batch(5)
        .with_trigger_gap(2)
}

#[test]
fn prefetch_triggers_once_near_tail() -> Result<()> {
    let root = unique_root("trigger");
    let store = Arc::new(PageStore::open(&root)?);
    for p in 10u16..=14 {
        put_page(&root, 0x0007, p);
    }
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(test_config(&root), store, capture_sink(captured.clone()));

    // remaining_ahead = 14 - 13 = 1 <= 2 — один запрос с хвоста кэша
    assert!(ctrl.update_position(0x0007, 13));
    {
        let reqs = captured.lock().unwrap();
        assert_eq!(reqs.as_slice(), &[(0x0007, 15, 5)]);
    }
    assert!(ctrl.prefetch_in_flight());

    // Повторный тик до прихода страниц второй запрос не выпускает
    assert!(!ctrl.update_position(0x0007, 13));
    assert_eq!(captured.lock().unwrap().len(), 1);
    Ok(())
}

#[test]
fn page_ready_completes_inflight() -> Result<()> {
    let root = unique_root("complete");
    let store = Arc::new(PageStore::open(&root)?);
    for p in 10u16..=14 {
        put_page(&root, 0x0007, p);
    }
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(
        test_config(&root),
        store.clone(),
        capture_sink(captured.clone()),
    );

    assert!(ctrl.update_position(0x0007, 13));

    // Страницы запроса приезжают по одной; до последней — флаг держится
    for p in 15u16..=19 {
        put_page(&root, 0x0007, p);
        ctrl.on_page_ready(0x0007, p);
        if p < 19 {
            assert!(ctrl.prefetch_in_flight());
        }
    }
    assert!(!ctrl.prefetch_in_flight());

    // После завершения запас впереди 19 - 13 = 6 > 2: нового запроса нет
    assert_eq!(captured.lock().unwrap().len(), 1);
    Ok(())
}

#[test]
fn eviction_keeps_retention_range() -> Result<()> {
    let root = unique_root("evict");
    let store = Arc::new(PageStore::open(&root)?);
    for p in 0u16..=20 {
        put_page(&root, 0x0007, p);
    }
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(
        test_config(&root),
        store.clone(),
        capture_sink(captured.clone()),
    );

    // remaining_ahead = 8 > 2: префетча нет, но вытеснение происходит
    assert!(!ctrl.update_position(0x0007, 12));
    assert!(captured.lock().unwrap().is_empty());

    for p in 0u16..=6 {
        assert!(!store.exists(0x0007, p), "page {} must be evicted", p);
    }
    for p in 7u16..=17 {
        assert!(store.exists(0x0007, p), "page {} must survive", p);
    }
    for p in 18u16..=20 {
        assert!(!store.exists(0x0007, p), "page {} must be evicted", p);
    }
    Ok(())
}

#[test]
fn retention_low_clamps_to_zero() -> Result<()> {
    let root = unique_root("clamp");
    let store = Arc::new(PageStore::open(&root)?);
    for p in 0u16..=8 {
        put_page(&root, 0x0001, p);
    }
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(
        test_config(&root),
        store.clone(),
        capture_sink(captured.clone()),
    );

    // current=2, keep_behind=5: нижняя граница 0, страницы 0..=7 живут
    ctrl.update_position(0x0001, 2);
    for p in 0u16..=7 {
        assert!(store.exists(0x0001, p));
    }
    assert!(!store.exists(0x0001, 8));
    Ok(())
}

#[test]
fn skip_ahead_requests_from_current_page() -> Result<()> {
    let root = unique_root("skip");
    let store = Arc::new(PageStore::open(&root)?);
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(test_config(&root), store, capture_sink(captured.clone()));

    // Пустой кэш: запрос стартует с текущей страницы, не с единицы
    assert!(ctrl.update_position(0x0009, 100));
    assert_eq!(captured.lock().unwrap().as_slice(), &[(0x0009, 100, 5)]);
    Ok(())
}

#[test]
fn jump_past_cached_tail_requests_from_current() -> Result<()> {
    let root = unique_root("jump");
    let store = Arc::new(PageStore::open(&root)?);
    for p in 0u16..=5 {
        put_page(&root, 0x0002, p);
    }
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(test_config(&root), store, capture_sink(captured.clone()));

    // current 50 > max_cached 5: восстановление со страницы чтения
    assert!(ctrl.update_position(0x0002, 50));
    assert_eq!(captured.lock().unwrap().as_slice(), &[(0x0002, 50, 5)]);
    Ok(())
}

#[test]
fn emit_failure_leaves_no_inflight() -> Result<()> {
    let root = unique_root("fail");
    let store = Arc::new(PageStore::open(&root)?);
    let fail = Arc::new(AtomicBool::new(true));
    let captured = Arc::new(Mutex::new(Vec::new()));

    let fail2 = fail.clone();
    let captured2 = captured.clone();
    let sink: RequestSink = Arc::new(move |frame: &[u8]| {
        if fail2.load(Ordering::SeqCst) {
            return Err(anyhow!("link down"));
        }
        captured2
            .lock()
            .unwrap()
            .push(LittleEndian::read_u16(&frame[3..5]));
        Ok(())
    });
    let ctrl = WindowController::new(test_config(&root), store, sink);

    // Отправка не удалась: флаг не взводится, тик вернул false
    assert!(!ctrl.update_position(0x0001, 10));
    assert!(!ctrl.prefetch_in_flight());

    // Линк ожил — следующий тик запрашивает снова
    fail.store(false, Ordering::SeqCst);
    assert!(ctrl.update_position(0x0001, 10));
    assert_eq!(captured.lock().unwrap().as_slice(), &[10u16]);
    Ok(())
}

#[test]
fn stale_prefetch_expires_and_reissues() -> Result<()> {
    let root = unique_root("stale");
    let store = Arc::new(PageStore::open(&root)?);
    let captured = Arc::new(Mutex::new(Vec::new()));
    let cfg = test_config(&root).with_prefetch_stale_secs(1);
    let ctrl = WindowController::new(cfg, store, capture_sink(captured.clone()));

    assert!(ctrl.update_position(0x0003, 0));
    assert!(ctrl.prefetch_in_flight());

    // Ответ не пришёл; по истечении порога запрос перестаёт числиться
    std::thread::sleep(std::time::Duration::from_millis(2100));
    assert!(ctrl.update_position(0x0003, 0));
    assert_eq!(captured.lock().unwrap().len(), 2);
    Ok(())
}

#[test]
fn end_frame_caps_prefetch_start() -> Result<()> {
    let root = unique_root("end");
    let store = Arc::new(PageStore::open(&root)?);
    for p in 10u16..=14 {
        put_page(&root, 0x0007, p);
    }
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(test_config(&root), store, capture_sink(captured.clone()));

    // Книга кончается на странице 14 — запрашивать с 15-й нечего
    ctrl.update_position(0x0007, 10);
    ctrl.on_end(0x0007, 14);
    assert!(!ctrl.update_position(0x0007, 13));
    assert!(captured.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn book_switch_resets_window_state() -> Result<()> {
    let root = unique_root("books");
    let store = Arc::new(PageStore::open(&root)?);
    let captured = Arc::new(Mutex::new(Vec::new()));
    let ctrl = WindowController::new(test_config(&root), store, capture_sink(captured.clone()));

    assert!(ctrl.update_position(0x0001, 0));
    assert!(ctrl.prefetch_in_flight());

    // Другая книга: незакрытый префетч прошлой не мешает новому
    assert!(ctrl.update_position(0x0002, 0));
    let reqs = captured.lock().unwrap();
    assert_eq!(reqs.as_slice(), &[(0x0001, 0, 5), (0x0002, 0, 5)]);
    Ok(())
}

#[test]
fn invalid_retention_config_rejected() {
    let cfg = CacheConfig::default().with_window(4, 5).with_retention(3, 5);
    assert!(cfg.validate().is_err());
    let cfg = CacheConfig::default().with_window(2, 6).with_retention(5, 5);
    assert!(cfg.validate().is_err());
    assert!(CacheConfig::default().validate().is_ok());
}
