//! proto — разбор кадров обменного протокола (парсер входящей стороны).
//!
//! Все целые — little-endian; кадр начинается с байта типа. Полей с
//! выравниванием на проводе нет: каждое поле читается по явному байтовому
//! смещению (константы в crate::consts), никаких struct-cast'ов.
//!
//! Виды кадров:
//! - Request (8 байт)  — [type=0x01][book_id u16][start_page u16][page_count u8][reserved u16]
//! - Data    (17+данные) — заголовок 11 байт + [offset u32][chunk_size u16][payload]
//! - End     (5 байт)  — [type=0x03][book_id u16][last_page u16]
//! - Ack     (0x04), Error (0xFF) — только байт типа.
//!
//! parse() возвращает типизированное представление поверх входного среза
//! (payload чанка — заимствованный срез, без копий). Некорректный кадр —
//! ошибка; неизвестный байт типа — Frame::Unknown (не ошибка разбора).

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    CHUNK_DATA_MAX, DATA_CHUNK_MIN_SIZE, DATA_OFF_BOOK_ID, DATA_OFF_CHUNK_OFFSET,
    DATA_OFF_CHUNK_SIZE, DATA_OFF_DATA_SIZE, DATA_OFF_PAGE_NUM, DATA_OFF_PAYLOAD, END_FRAME_SIZE,
    END_OFF_BOOK_ID, END_OFF_LAST_PAGE, FRAME_ACK, FRAME_DATA, FRAME_END, FRAME_ERROR,
    FRAME_REQUEST, PAGE_BITMAP_SIZE, REQUEST_FRAME_SIZE, REQ_OFF_BOOK_ID, REQ_OFF_PAGE_COUNT,
    REQ_OFF_START_PAGE, REQ_PAGES_MAX,
};

pub mod request;

pub use request::make_request;

/// Заголовок Data-кадра (11 байт на проводе).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub book_id: u16,
    pub page_num: u16,
    /// Полный размер страницы; у валидного кадра всегда PAGE_BITMAP_SIZE.
    pub data_size: u32,
}

/// Фрагмент страницы: payload по смещению offset внутри битмапа.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub offset: u32,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    pub book_id: u16,
    pub start_page: u16,
    pub page_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndFrame {
    pub book_id: u16,
    pub last_page: u16,
}

/// Типизированный взгляд на входящий кадр.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    Request(RequestFrame),
    DataChunk(DataHeader, Chunk<'a>),
    End(EndFrame),
    Ack,
    PeerError,
    Unknown(u8),
}

/// Классифицировать и проверить входящий кадр.
///
/// Ошибки: пустой вход, усечённый кадр, data_size != PAGE_BITMAP_SIZE,
/// chunk_size > CHUNK_DATA_MAX. Превышение page_count в Request не
/// фатально — значение зажимается до REQ_PAGES_MAX.
pub fn parse(buf: &[u8]) -> Result<Frame<'_>> {
    if buf.is_empty() {
        return Err(anyhow!("empty frame"));
    }
    match buf[0] {
        FRAME_REQUEST => parse_request(buf),
        FRAME_DATA => parse_data_chunk(buf),
        FRAME_END => parse_end(buf),
        FRAME_ACK => Ok(Frame::Ack),
        FRAME_ERROR => Ok(Frame::PeerError),
        t => Ok(Frame::Unknown(t)),
    }
}

fn parse_request(buf: &[u8]) -> Result<Frame<'_>> {
    if buf.len() < REQUEST_FRAME_SIZE {
        return Err(anyhow!(
            "truncated request frame: {} bytes (need {})",
            buf.len(),
            REQUEST_FRAME_SIZE
        ));
    }
    let book_id = LittleEndian::read_u16(&buf[REQ_OFF_BOOK_ID..REQ_OFF_BOOK_ID + 2]);
    let start_page = LittleEndian::read_u16(&buf[REQ_OFF_START_PAGE..REQ_OFF_START_PAGE + 2]);
    let mut page_count = buf[REQ_OFF_PAGE_COUNT];
    if page_count > REQ_PAGES_MAX {
        log::debug!(
            "request page_count {} clamped to {}",
            page_count,
            REQ_PAGES_MAX
        );
        page_count = REQ_PAGES_MAX;
    }
    Ok(Frame::Request(RequestFrame {
        book_id,
        start_page,
        page_count,
    }))
}

fn parse_data_chunk(buf: &[u8]) -> Result<Frame<'_>> {
    if buf.len() < DATA_CHUNK_MIN_SIZE {
        return Err(anyhow!(
            "truncated data frame: {} bytes (need at least {})",
            buf.len(),
            DATA_CHUNK_MIN_SIZE
        ));
    }

    let book_id = LittleEndian::read_u16(&buf[DATA_OFF_BOOK_ID..DATA_OFF_BOOK_ID + 2]);
    let page_num = LittleEndian::read_u16(&buf[DATA_OFF_PAGE_NUM..DATA_OFF_PAGE_NUM + 2]);
    let data_size = LittleEndian::read_u32(&buf[DATA_OFF_DATA_SIZE..DATA_OFF_DATA_SIZE + 4]);
    let offset = LittleEndian::read_u32(&buf[DATA_OFF_CHUNK_OFFSET..DATA_OFF_CHUNK_OFFSET + 4]);
    let chunk_size =
        LittleEndian::read_u16(&buf[DATA_OFF_CHUNK_SIZE..DATA_OFF_CHUNK_SIZE + 2]) as usize;

    if data_size as usize != PAGE_BITMAP_SIZE {
        return Err(anyhow!(
            "data frame with data_size {} (page bitmap is {})",
            data_size,
            PAGE_BITMAP_SIZE
        ));
    }
    if chunk_size > CHUNK_DATA_MAX {
        return Err(anyhow!(
            "chunk_size {} exceeds max {}",
            chunk_size,
            CHUNK_DATA_MAX
        ));
    }
    if buf.len() < DATA_OFF_PAYLOAD + chunk_size {
        return Err(anyhow!(
            "data frame payload truncated: have {}, chunk_size {}",
            buf.len() - DATA_OFF_PAYLOAD,
            chunk_size
        ));
    }

    Ok(Frame::DataChunk(
        DataHeader {
            book_id,
            page_num,
            data_size,
        },
        Chunk {
            offset,
            data: &buf[DATA_OFF_PAYLOAD..DATA_OFF_PAYLOAD + chunk_size],
        },
    ))
}

fn parse_end(buf: &[u8]) -> Result<Frame<'_>> {
    if buf.len() < END_FRAME_SIZE {
        return Err(anyhow!(
            "truncated end frame: {} bytes (need {})",
            buf.len(),
            END_FRAME_SIZE
        ));
    }
    Ok(Frame::End(EndFrame {
        book_id: LittleEndian::read_u16(&buf[END_OFF_BOOK_ID..END_OFF_BOOK_ID + 2]),
        last_page: LittleEndian::read_u16(&buf[END_OFF_LAST_PAGE..END_OFF_LAST_PAGE + 2]),
    }))
}
