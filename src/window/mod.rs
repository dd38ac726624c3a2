//! window — контроллер скользящего окна (префетч + вытеснение).
//!
//! Контроллер не хранит байты страниц: он рассуждает над ключами
//! (book_id, page_num), спрашивает store о резидентном множестве и держит
//! два побочных эффекта позиции чтения:
//! - когда впереди остаётся мало страниц, выпускает один Request через
//!   RequestSink (не больше одного незакрытого префетча на книгу, I6);
//! - вытесняет полные страницы вне диапазона удержания
//!   [current - keep_behind, current + keep_ahead].
//!
//! Каждый тик — полное перевычисление от текущего состояния store, поэтому
//! гонка update_position / page_ready сходится сама. Повторных отправок
//! нет: незакрытый префетч либо завершается приходом всех страниц, либо
//! устаревает по настенным часам и перестаёт считаться активным.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::config::CacheConfig;
use crate::consts::{REQUEST_FRAME_SIZE, REQ_PAGES_MAX};
use crate::metrics::{
    record_pages_evicted, record_prefetch_request, record_prefetch_timeout,
};
use crate::proto::make_request;
use crate::store::PageStore;
use crate::util::now_secs;

/// Канал отправки Request-кадров в линк. Контроллеру всё равно, как кадр
/// доедет до пира; ошибка отправки — лог и повтор на следующем тике.
pub type RequestSink = Arc<dyn Fn(&[u8]) -> Result<()> + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy)]
struct Inflight {
    start_page: u16,
    page_count: u8,
    issued_at: u32,
}

#[derive(Debug, Default)]
struct WindowState {
    book_id: Option<u16>,
    current_page: u16,
    /// Номер последней страницы книги, если пир сообщил его End-кадром.
    last_page: Option<u16>,
    inflight: Option<Inflight>,
}

pub struct WindowController {
    cfg: CacheConfig,
    store: Arc<PageStore>,
    sink: RequestSink,
    state: Mutex<WindowState>,
}

impl WindowController {
    pub fn new(cfg: CacheConfig, store: Arc<PageStore>, sink: RequestSink) -> Self {
        Self {
            cfg,
            store,
            sink,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Единственная точка входа UI: вызывается после каждого перелистывания.
    /// Возвращает true, если был выпущен префетч.
    pub fn update_position(&self, book_id: u16, current_page: u16) -> bool {
        let mut st = self.state.lock().unwrap();

        if st.book_id != Some(book_id) {
            // Новая книга: знания о прошлой не переносятся.
            st.last_page = None;
            st.inflight = None;
            st.book_id = Some(book_id);
        }
        st.current_page = current_page;

        self.expire_stale(&mut st);
        let issued = self.maybe_prefetch(&mut st);
        self.evict_outside_retention(&st);
        issued
    }

    /// Реакция на завершение страницы реассемблером.
    pub fn on_page_ready(&self, book_id: u16, page_num: u16) {
        let mut st = self.state.lock().unwrap();
        if st.book_id != Some(book_id) {
            return;
        }
        let covered = st.inflight.map_or(false, |f| {
            page_num >= f.start_page
                && (page_num as u32) < f.start_page as u32 + f.page_count as u32
        });
        if !covered {
            return;
        }
        if self.inflight_complete(&st) {
            st.inflight = None;
            // Перепроверка без нового события UI: возможно, надо ещё.
            self.maybe_prefetch(&mut st);
            self.evict_outside_retention(&st);
        }
    }

    /// End-кадр: пир сообщил номер последней страницы книги.
    pub fn on_end(&self, book_id: u16, last_page: u16) {
        let mut st = self.state.lock().unwrap();
        if st.book_id != Some(book_id) {
            return;
        }
        log::info!("book end: book={:04x}, last_page={}", book_id, last_page);
        st.last_page = Some(last_page);
        // Страницы за last_page не приедут никогда — префетч, который их
        // ждал, закрывается по фактически доступному хвосту.
        if st.inflight.is_some() && self.inflight_complete(&st) {
            st.inflight = None;
        }
    }

    /// Есть ли сейчас незакрытый префетч (для диагностики и тестов).
    pub fn prefetch_in_flight(&self) -> bool {
        self.state.lock().unwrap().inflight.is_some()
    }

    // --------------------------- внутренности ---------------------------

    fn expire_stale(&self, st: &mut WindowState) {
        if let Some(f) = st.inflight {
            let age = now_secs().saturating_sub(f.issued_at);
            if age > self.cfg.prefetch_stale_secs {
                log::warn!(
                    "prefetch stale after {}s: start={}, count={}",
                    age,
                    f.start_page,
                    f.page_count
                );
                record_prefetch_timeout();
                st.inflight = None;
            }
        }
    }

    /// Шаги 1–3 алгоритма окна: оценить запас впереди и при необходимости
    /// выпустить один Request.
    fn maybe_prefetch(&self, st: &mut WindowState) -> bool {
        let Some(book_id) = st.book_id else {
            return false;
        };
        if st.inflight.is_some() {
            return false;
        }

        let max_cached = match self.store.max_page(book_id) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("max_page scan failed: {e:#}");
                None
            }
        };

        let current = st.current_page;
        let remaining_ahead = match max_cached {
            Some(max) => max.saturating_sub(current),
            None => 0,
        };
        if remaining_ahead > self.cfg.trigger_gap {
            return false;
        }

        // Начало запроса: продолжаем хвост кэша, либо с текущей страницы
        // после скачка или на пустом кэше.
        let start_page = match max_cached {
            Some(max) if max >= current => match max.checked_add(1) {
                Some(next) => next,
                None => return false, // хвост упёрся в u16::MAX
            },
            _ => current,
        };
        if let Some(last) = st.last_page {
            if start_page > last {
                return false; // книга уже докачана до конца
            }
        }

        let page_count = self.cfg.request_batch.min(REQ_PAGES_MAX);
        let mut buf = [0u8; REQUEST_FRAME_SIZE];
        let n = make_request(book_id, start_page, page_count, &mut buf);
        if n == 0 {
            return false;
        }

        match (self.sink)(&buf[..n]) {
            Ok(()) => {
                log::info!(
                    "prefetch triggered: book={:04x}, start_page={}, count={}",
                    book_id,
                    start_page,
                    page_count
                );
                record_prefetch_request();
                st.inflight = Some(Inflight {
                    start_page,
                    page_count,
                    issued_at: now_secs(),
                });
                true
            }
            Err(e) => {
                // Без флага in-flight следующий тик попробует снова.
                log::warn!("failed to emit request: {e:#}");
                false
            }
        }
    }

    /// Шаг 4: удержание. Всё вне [current - keep_behind, current + keep_ahead]
    /// вычищается; неудача — лог, повтор на следующем тике.
    fn evict_outside_retention(&self, st: &WindowState) {
        let Some(book_id) = st.book_id else {
            return;
        };
        let low = st.current_page.saturating_sub(self.cfg.keep_behind);
        let high = st.current_page.saturating_add(self.cfg.keep_ahead);
        match self.store.cleanup_outside(book_id, low, high) {
            Ok(0) => {}
            Ok(n) => {
                record_pages_evicted(n as u64);
                log::info!(
                    "evicted {} pages outside [{}, {}]: book={:04x}",
                    n,
                    low,
                    high,
                    book_id
                );
            }
            Err(e) => {
                log::warn!("eviction scan failed: {e:#}");
            }
        }
    }

    /// Все ли страницы незакрытого префетча уже на диске. Страницы за
    /// last_page считаются удовлетворёнными: их не существует.
    fn inflight_complete(&self, st: &WindowState) -> bool {
        let (Some(book_id), Some(f)) = (st.book_id, st.inflight) else {
            return false;
        };
        let end = f.start_page as u32 + f.page_count as u32;
        for page in f.start_page as u32..end {
            if page > u16::MAX as u32 {
                break;
            }
            let page = page as u16;
            if let Some(last) = st.last_page {
                if page > last {
                    break;
                }
            }
            if !self.store.exists(book_id, page) {
                return false;
            }
        }
        true
    }
}
