//! assemble — сборка страницы из чанков (единственный receive slot).
//!
//! Слот владеет потоковым писателем store и применяет чанки строго по
//! порядку смещений: offset очередного чанка обязан равняться числу уже
//! записанных байт. Страница никогда не собирается в RAM — payload уходит
//! в файл сразу, хэндл остаётся открытым между чанками одного ключа.
//!
//! Машина состояний слота: Empty -> Assembling(key, written) -> Empty
//! (finalize или abort). В любой момент на диске не больше одного
//! частичного файла.
//!
//! Политика ошибок: любое нарушение (offset mismatch, превышение размера
//! чанка, переполнение страницы, ошибка I/O) закрывает и удаляет частичный
//! файл, очищает слот и возвращает ошибку. Повторных попыток здесь нет —
//! контроллер перезапросит страницу на следующем тике.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use crate::consts::{CHUNK_DATA_MAX, PAGE_BITMAP_SIZE};
use crate::metrics::{record_chunk_applied, record_page_completed, record_reassembly_abort};
use crate::proto::{Chunk, DataHeader};
use crate::store::{PageStore, PageWriter};
use crate::subs::{PageReady, SubRegistry};

struct Slot {
    book_id: u16,
    page_num: u16,
    written: u32,
    writer: PageWriter,
}

pub struct Reassembler {
    store: Arc<PageStore>,
    subs: Arc<SubRegistry>,
    slot: Option<Slot>,
}

impl Reassembler {
    pub fn new(store: Arc<PageStore>, subs: Arc<SubRegistry>) -> Self {
        Self {
            store,
            subs,
            slot: None,
        }
    }

    /// Ключ текущего слота, если сборка идёт.
    pub fn active_key(&self) -> Option<(u16, u16)> {
        self.slot.as_ref().map(|s| (s.book_id, s.page_num))
    }

    /// Применить один чанк. Ok(true) — страница завершена и опубликована,
    /// Ok(false) — сборка продолжается.
    pub fn on_chunk(&mut self, hdr: &DataHeader, chunk: &Chunk<'_>) -> Result<bool> {
        // Смена ключа: бросаем незавершённую страницу и начинаем новую.
        let key_matches = self
            .slot
            .as_ref()
            .map(|s| s.book_id == hdr.book_id && s.page_num == hdr.page_num)
            .unwrap_or(false);
        if !key_matches {
            if let Some(stale) = self.slot.take() {
                log::warn!(
                    "abandoning partial page: book={:04x}, page={}, received={} bytes",
                    stale.book_id,
                    stale.page_num,
                    stale.written
                );
                stale.writer.abort();
            }
            let writer = self
                .store
                .open_for_append(hdr.book_id, hdr.page_num)
                .with_context(|| {
                    format!(
                        "open receive slot: book={:04x}, page={}",
                        hdr.book_id, hdr.page_num
                    )
                })?;
            log::info!(
                "starting page reception: book={:04x}, page={}",
                hdr.book_id,
                hdr.page_num
            );
            self.slot = Some(Slot {
                book_id: hdr.book_id,
                page_num: hdr.page_num,
                written: 0,
                writer,
            });
        }

        let Some(slot) = self.slot.as_mut() else {
            return Err(anyhow!("receive slot missing"));
        };

        if chunk.offset != slot.written {
            let (expected, got) = (slot.written, chunk.offset);
            self.abort_slot();
            return Err(anyhow!(
                "chunk offset mismatch: expected={}, got={}",
                expected,
                got
            ));
        }
        if chunk.data.len() > CHUNK_DATA_MAX {
            let got = chunk.data.len();
            self.abort_slot();
            return Err(anyhow!("chunk size {} exceeds max {}", got, CHUNK_DATA_MAX));
        }
        if slot.written as usize + chunk.data.len() > PAGE_BITMAP_SIZE {
            let (written, got) = (slot.written, chunk.data.len());
            self.abort_slot();
            return Err(anyhow!(
                "page overflow: written={}, chunk={}, page={}",
                written,
                got,
                PAGE_BITMAP_SIZE
            ));
        }

        // Пустой чанк допустим и ничего не меняет.
        if !chunk.data.is_empty() {
            if let Err(e) = slot.writer.append(chunk.data) {
                self.abort_slot();
                return Err(e.context("chunk write failed"));
            }
            slot.written += chunk.data.len() as u32;
            record_chunk_applied(chunk.data.len());
        }

        log::debug!(
            "chunk applied: offset={}, size={}, total={}/{}",
            chunk.offset,
            chunk.data.len(),
            slot.written,
            PAGE_BITMAP_SIZE
        );

        if slot.written as usize == PAGE_BITMAP_SIZE {
            return self.finalize_slot().map(|_| true);
        }
        Ok(false)
    }

    /// Принудительно сбросить слот (например, при shutdown).
    pub fn reset(&mut self) {
        if self.slot.is_some() {
            self.abort_slot();
        }
    }

    fn abort_slot(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.writer.abort();
            record_reassembly_abort();
        }
    }

    fn finalize_slot(&mut self) -> Result<()> {
        let Some(slot) = self.slot.take() else {
            return Ok(());
        };
        let (book_id, page_num) = (slot.book_id, slot.page_num);

        let len = match slot.writer.finalize() {
            Ok(len) => len,
            Err(e) => {
                record_reassembly_abort();
                return Err(e.context("close page file"));
            }
        };
        if len != PAGE_BITMAP_SIZE as u64 {
            // Файл после закрытия не того размера — страница негодна.
            let _ = self.store.remove(book_id, page_num);
            record_reassembly_abort();
            return Err(anyhow!(
                "page file size {} after close (expected {}): book={:04x}, page={}",
                len,
                PAGE_BITMAP_SIZE,
                book_id,
                page_num
            ));
        }

        record_page_completed();
        log::info!("page saved: book={:04x}, page={}, size={}", book_id, page_num, len);

        // Публикация строго после закрытия файла: подписчики могут сразу
        // открыть страницу на чтение.
        self.subs.publish(&PageReady { book_id, page_num });
        Ok(())
    }
}
