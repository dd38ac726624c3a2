//! proto/request — формирование Request-кадра для отправки в линк.
//!
//! Что здесь:
//! - make_request: записать 8-байтовый кадр запроса в буфер вызывающего
//!   кода. Поля пишутся по явным смещениям, без аллокаций.
//!
//! Emitter чист по отношению к кэшу: состояние store его не касается.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    FRAME_REQUEST, REQUEST_FRAME_SIZE, REQ_OFF_BOOK_ID, REQ_OFF_PAGE_COUNT, REQ_OFF_RESERVED,
    REQ_OFF_START_PAGE, REQ_OFF_TYPE, REQ_PAGES_MAX,
};

/// Сформировать Request-кадр для (book_id, start_page, page_count).
///
/// Поведение:
/// - page_count зажимается до REQ_PAGES_MAX.
/// - Возвращает число записанных байт; 0 — буфер мал.
/// - reserved всегда записывается нулями.
pub fn make_request(book_id: u16, start_page: u16, page_count: u8, buf: &mut [u8]) -> usize {
    if buf.len() < REQUEST_FRAME_SIZE {
        return 0;
    }

    let count = page_count.min(REQ_PAGES_MAX);

    buf[REQ_OFF_TYPE] = FRAME_REQUEST;
    LittleEndian::write_u16(&mut buf[REQ_OFF_BOOK_ID..REQ_OFF_BOOK_ID + 2], book_id);
    LittleEndian::write_u16(
        &mut buf[REQ_OFF_START_PAGE..REQ_OFF_START_PAGE + 2],
        start_page,
    );
    buf[REQ_OFF_PAGE_COUNT] = count;
    LittleEndian::write_u16(&mut buf[REQ_OFF_RESERVED..REQ_OFF_RESERVED + 2], 0);

    log::debug!(
        "request frame: book={:04x}, pages={}..={}, count={}",
        book_id,
        start_page,
        start_page.saturating_add(count as u16).saturating_sub(1),
        count
    );

    REQUEST_FRAME_SIZE
}
