//! cache — фасад подсистемы: связывает parser, reassembler, store и
//! window controller в один объект с узким API для линка и UI.
//!
//! Путь данных: линк -> handle_frame -> reassembler -> store ->
//! (page_ready) -> controller -> (при нехватке) RequestSink -> линк.
//! Путь управления: UI -> update_position / read_page.
//!
//! Политика ошибок на границе: UI видит ровно два отказа — «страницы ещё
//! нет» (read_page == 0) и «кэш недоступен» (ошибка open). Ошибки RX-пути
//! гасятся здесь: кадр отброшен, счётчики обновлены, подсистема в
//! определённом состоянии, контроллер перезапросит страницу сам.

use anyhow::{Context, Result};
use std::fs;
use std::sync::{Arc, Mutex};

use crate::assemble::Reassembler;
use crate::config::CacheConfig;
use crate::lock::{self, LockGuard};
use crate::metrics::{
    record_frame_dropped, record_frame_parsed, record_read_hit, record_read_miss,
};
use crate::proto::{self, Frame};
use crate::store::{CacheStats, PageStore};
use crate::subs::{self, SubRegistry, SubscriptionHandle};
use crate::window::{RequestSink, WindowController};

pub struct PageCache {
    cfg: CacheConfig,
    store: Arc<PageStore>,
    controller: Arc<WindowController>,
    subs: Arc<SubRegistry>,
    // Единственный receive slot; RX-путь сериализуется этим мьютексом.
    rx: Mutex<Reassembler>,
    _page_ready_sub: SubscriptionHandle,
    _lock: LockGuard,
}

impl PageCache {
    /// Открыть кэш: создать каталог при необходимости, взять эксклюзивную
    /// блокировку и связать компоненты. Request-кадры уходят в `sink`.
    pub fn open(cfg: CacheConfig, sink: RequestSink) -> Result<Self> {
        cfg.validate().context("cache config")?;
        fs::create_dir_all(&cfg.root)
            .with_context(|| format!("create cache dir {}", cfg.root.display()))?;
        let lock_guard = lock::try_acquire_exclusive_lock(&cfg.root)?;

        let store = Arc::new(PageStore::open(&cfg.root)?);
        let subs_reg = SubRegistry::new();
        let controller = Arc::new(WindowController::new(cfg.clone(), store.clone(), sink));

        // Контроллер слушает page_ready по всем книгам.
        let ctrl = controller.clone();
        let page_ready_sub = subs_reg.subscribe(
            None,
            subs::callback(move |ev| ctrl.on_page_ready(ev.book_id, ev.page_num)),
        );

        let rx = Mutex::new(Reassembler::new(store.clone(), subs_reg.clone()));

        log::info!("page cache opened: {}", cfg);
        Ok(Self {
            cfg,
            store,
            controller,
            subs: subs_reg,
            rx,
            _page_ready_sub: page_ready_sub,
            _lock: lock_guard,
        })
    }

    /// Принять один входящий датаграм-кадр от линка.
    ///
    /// Некорректные кадры отбрасываются со счётчиком; ошибки сборки гасятся
    /// (частичный файл уже удалён, контроллер перезапросит страницу).
    pub fn handle_frame(&self, bytes: &[u8]) {
        let frame = match proto::parse(bytes) {
            Ok(f) => {
                record_frame_parsed();
                f
            }
            Err(e) => {
                record_frame_dropped();
                log::debug!("dropped frame: {e:#}");
                return;
            }
        };

        match frame {
            Frame::DataChunk(hdr, chunk) => {
                let mut rx = self.rx.lock().unwrap();
                if let Err(e) = rx.on_chunk(&hdr, &chunk) {
                    log::warn!(
                        "chunk rejected: book={:04x}, page={}: {e:#}",
                        hdr.book_id,
                        hdr.page_num
                    );
                }
            }
            Frame::End(end) => {
                self.controller.on_end(end.book_id, end.last_page);
            }
            Frame::Ack => {
                log::debug!("ack frame");
            }
            Frame::PeerError => {
                log::warn!("peer reported error");
            }
            Frame::Request(req) => {
                // Запросы шлём мы; входящий Request здесь не обслуживается.
                log::debug!(
                    "ignoring inbound request frame: book={:04x}, start={}",
                    req.book_id,
                    req.start_page
                );
            }
            Frame::Unknown(t) => {
                record_frame_dropped();
                log::debug!("unknown frame type {t:#04x}");
            }
        }
    }

    /// Прочитать полную страницу для UI. Возвращает число байт; 0 означает
    /// «страницы ещё нет» — UI показывает заглушку и пробует позже.
    pub fn read_page(&self, book_id: u16, page_num: u16, buf: &mut [u8]) -> Result<usize> {
        let n = self.store.read(book_id, page_num, buf)?;
        if n > 0 {
            record_read_hit();
        } else {
            record_read_miss();
        }
        Ok(n)
    }

    /// Сообщить позицию чтения; возвращает true, если выпущен префетч.
    pub fn update_position(&self, book_id: u16, current_page: u16) -> bool {
        self.controller.update_position(book_id, current_page)
    }

    /// Подписка на page_ready (например, для перерисовки экрана).
    pub fn subscribe_page_ready(
        &self,
        book: Option<u16>,
        cb: impl Fn(u16, u16) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subs
            .subscribe(book, subs::callback(move |ev| cb(ev.book_id, ev.page_num)))
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.store.stats()
    }

    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }
}

impl Drop for PageCache {
    fn drop(&mut self) {
        // Незавершённый слот не должен пережить владельца кэша.
        if let Ok(mut rx) = self.rx.lock() {
            rx.reset();
        }
        log::info!("page cache closed");
    }
}
