//! Общие константы форматов (wire protocol, on-disk cache).

// -------- Pages --------
// Каждая полная страница — ровно 48 KiB растрового битмапа.
pub const PAGE_BITMAP_SIZE: usize = 48 * 1024;

// -------- Frame types --------
pub const FRAME_REQUEST: u8 = 0x01;
pub const FRAME_DATA: u8 = 0x02;
pub const FRAME_END: u8 = 0x03;
pub const FRAME_ACK: u8 = 0x04;
pub const FRAME_ERROR: u8 = 0xFF;

// -------- Request frame --------
// Формат (8 байт, LE):
// [type u8=0x01][book_id u16][start_page u16][page_count u8][reserved u16=0]
pub const REQUEST_FRAME_SIZE: usize = 8;
pub const REQ_PAGES_MAX: u8 = 5;

pub const REQ_OFF_TYPE: usize = 0;
pub const REQ_OFF_BOOK_ID: usize = 1;
pub const REQ_OFF_START_PAGE: usize = 3;
pub const REQ_OFF_PAGE_COUNT: usize = 5;
pub const REQ_OFF_RESERVED: usize = 6;

// -------- Data-chunk frame --------
// Заголовок (11 байт):
// [type u8=0x02][book_id u16][page_num u16][reserved u16][data_size u32]
// Далее поля чанка и payload:
// [offset u32][chunk_size u16][data <= 227]
//
// Полный кадр <= 244 байта — укладывается в линк-MTU 247.
pub const DATA_HDR_SIZE: usize = 11;
pub const CHUNK_DATA_MAX: usize = 227;
pub const DATA_CHUNK_MIN_SIZE: usize = DATA_HDR_SIZE + 4 + 2; // 17: заголовок + offset + chunk_size
pub const DATA_FRAME_MAX_SIZE: usize = DATA_CHUNK_MIN_SIZE + CHUNK_DATA_MAX;

pub const DATA_OFF_TYPE: usize = 0;
pub const DATA_OFF_BOOK_ID: usize = 1;
pub const DATA_OFF_PAGE_NUM: usize = 3;
pub const DATA_OFF_RESERVED: usize = 5;
pub const DATA_OFF_DATA_SIZE: usize = 7;
pub const DATA_OFF_CHUNK_OFFSET: usize = 11;
pub const DATA_OFF_CHUNK_SIZE: usize = 15;
pub const DATA_OFF_PAYLOAD: usize = 17;

// -------- End frame --------
// [type u8=0x03][book_id u16][last_page u16]
pub const END_FRAME_SIZE: usize = 5;

pub const END_OFF_TYPE: usize = 0;
pub const END_OFF_BOOK_ID: usize = 1;
pub const END_OFF_LAST_PAGE: usize = 3;

// -------- Cache directory --------
// Имя файла страницы: book_{book_id:04x}_page_{page_num:05}.bin
pub const CACHE_DIR_DEFAULT: &str = "ble_pages";
pub const PAGE_FILE_PREFIX: &str = "book_";
pub const PAGE_FILE_EXT: &str = ".bin";
pub const LOCK_FILE: &str = "LOCK";
