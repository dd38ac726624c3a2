//! util — общие утилиты (вынесено из store и window).
//!
//! Содержит:
//! - now_secs(): текущее Unix-время в секундах (u32, saturating).
//! - page_file_name() / parse_page_file_name(): формат и разбор имени
//!   файла страницы в каталоге кэша.
//!
//! Грамматика имени — единственная точка сцепления store и контроллера,
//! поэтому обе стороны живут в одном месте.

use crate::consts::{PAGE_FILE_EXT, PAGE_FILE_PREFIX};

/// Текущее Unix-время в секундах, обрезанное к u32 (saturating).
#[inline]
pub fn now_secs() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs()).min(u32::MAX as u64) as u32
}

/// Имя файла страницы: `book_{book_id:04x}_page_{page_num:05}.bin`.
#[inline]
pub fn page_file_name(book_id: u16, page_num: u16) -> String {
    format!(
        "{}{:04x}_page_{:05}{}",
        PAGE_FILE_PREFIX, book_id, page_num, PAGE_FILE_EXT
    )
}

/// Разобрать имя файла страницы. Возвращает Some((book_id, page_num))
/// только для имён, точно соответствующих грамматике; всё прочее — None.
pub fn parse_page_file_name(name: &str) -> Option<(u16, u16)> {
    let rest = name.strip_prefix(PAGE_FILE_PREFIX)?;
    let book_hex = rest.get(..4)?;
    if !book_hex
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    let book_id = u16::from_str_radix(book_hex, 16).ok()?;

    let rest = rest.get(4..)?.strip_prefix("_page_")?;
    let page_dec = rest.get(..5)?;
    if !page_dec.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let page: u32 = page_dec.parse().ok()?;
    if page > u16::MAX as u32 {
        return None;
    }

    // После 5 цифр допускается только расширение, без хвоста.
    if rest.get(5..)? != PAGE_FILE_EXT {
        return None;
    }
    Some((book_id, page as u16))
}
