//! store — on-disk кэш страниц (каталог + файлы фиксированного размера).
//!
//! Владеет пространством имён каталога кэша: все мутации файловой системы
//! идут через PageStore. Имя файла — тотальная функция ключа
//! (book_id, page_num), см. util::page_file_name.
//!
//! Правила:
//! - Полная страница — файл ровно PAGE_BITMAP_SIZE байт. Файл иного
//!   размера считается отсутствующим (exists/read) и вычищается
//!   cleanup_outside/clear_*.
//! - Имена вне грамматики перечислением игнорируются и никогда не
//!   удаляются.
//! - Отсутствующий каталог создаётся лениво.
//! - Каждая операция сериализуется внутренним мьютексом: пути RX
//!   (reassembler) и UI (evictions контроллера) не пересекаются на
//!   каталоге. Пока открыт receive slot, операции store по тому же ключу
//!   запрещены (дисциплина вызывающего кода).

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::consts::PAGE_BITMAP_SIZE;
use crate::util::{page_file_name, parse_page_file_name};

pub struct PageStore {
    root: PathBuf,
    // Сериализация операций над каталогом (RX-путь и evictions UI).
    dir_lock: Mutex<()>,
}

/// Статистика кэша. free_bytes — None, если файловая система не отвечает.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub cached_pages: u32,
    pub total_bytes: u64,
    pub free_bytes: Option<u64>,
}

/// Потоковый писатель одной страницы. Хэндл держится открытым через много
/// чанков; закрывается ровно один раз — finalize или abort.
pub struct PageWriter {
    file: File,
    path: PathBuf,
}

impl PageWriter {
    /// Дописать очередной фрагмент в текущую позицию (без seek).
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .with_context(|| format!("append to {}", self.path.display()))?;
        Ok(())
    }

    /// Закрыть файл с fsync и вернуть его размер по данным каталога.
    /// Размер берётся по пути после закрытия: если файл тем временем
    /// вычищен (eviction), это видно как ошибка, а не как фантомная
    /// готовая страница.
    pub fn finalize(self) -> Result<u64> {
        self.file
            .sync_all()
            .with_context(|| format!("fsync {}", self.path.display()))?;
        let path = self.path;
        drop(self.file);
        let len = fs::metadata(&path)
            .with_context(|| format!("stat after close {}", path.display()))?
            .len();
        Ok(len)
    }

    /// Закрыть и удалить частичный файл (best-effort).
    pub fn abort(self) {
        let path = self.path;
        drop(self.file);
        let _ = fs::remove_file(&path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageStore {
    /// Открыть store над каталогом кэша; каталог создаётся при
    /// необходимости.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create cache dir {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            dir_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, book_id: u16, page_num: u16) -> PathBuf {
        self.root.join(page_file_name(book_id, page_num))
    }

    /// Есть ли полная страница (файл ровно PAGE_BITMAP_SIZE байт).
    pub fn exists(&self, book_id: u16, page_num: u16) -> bool {
        let _g = self.dir_lock.lock().unwrap();
        match fs::metadata(self.page_path(book_id, page_num)) {
            Ok(m) => m.is_file() && m.len() == PAGE_BITMAP_SIZE as u64,
            Err(_) => false,
        }
    }

    /// Открыть потоковый писатель для (book_id, page_num).
    /// Существующий частичный файл по этому ключу перетирается — дубликаты
    /// от пира начинают страницу заново.
    pub fn open_for_append(&self, book_id: u16, page_num: u16) -> Result<PageWriter> {
        let _g = self.dir_lock.lock().unwrap();
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create cache dir {}", self.root.display()))?;
        let path = self.page_path(book_id, page_num);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("open for append {}", path.display()))?;
        Ok(PageWriter { file, path })
    }

    /// Прочитать до min(buf.len(), размер файла) байт страницы с нулевого
    /// смещения. Отсутствующая или неполная страница — Ok(0).
    pub fn read(&self, book_id: u16, page_num: u16, buf: &mut [u8]) -> Result<usize> {
        let _g = self.dir_lock.lock().unwrap();
        let path = self.page_path(book_id, page_num);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(anyhow!(e)).with_context(|| format!("open {}", path.display()))
            }
        };
        let len = file
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        if len != PAGE_BITMAP_SIZE as u64 {
            // Неполный или повреждённый файл — для читателя страницы нет.
            return Ok(0);
        }
        let want = (buf.len() as u64).min(len) as usize;
        file.read_exact(&mut buf[..want])
            .with_context(|| format!("read {}", path.display()))?;
        Ok(want)
    }

    /// Минимальный закэшированный номер страницы книги.
    pub fn min_page(&self, book_id: u16) -> Result<Option<u16>> {
        let _g = self.dir_lock.lock().unwrap();
        self.fold_book_pages(book_id, None, |acc, page, _| match acc {
            Some(min) if min <= page => Some(min),
            _ => Some(page),
        })
    }

    /// Максимальный закэшированный номер страницы книги.
    pub fn max_page(&self, book_id: u16) -> Result<Option<u16>> {
        let _g = self.dir_lock.lock().unwrap();
        self.fold_book_pages(book_id, None, |acc, page, _| match acc {
            Some(max) if max >= page => Some(max),
            _ => Some(page),
        })
    }

    /// Удалить страницы книги вне [low, high], а также файлы книги
    /// неполного размера (I2: такие страницы считаются отсутствующими).
    /// Возвращает число удалённых файлов. Идемпотентна.
    pub fn cleanup_outside(&self, book_id: u16, low: u16, high: u16) -> Result<u32> {
        let _g = self.dir_lock.lock().unwrap();
        self.delete_book_matching(book_id, |page, len| {
            page < low || page > high || len != PAGE_BITMAP_SIZE as u64
        })
    }

    /// Удалить файл одной страницы независимо от размера.
    /// Ok(true) — файл был и удалён; Ok(false) — файла не было.
    pub fn remove(&self, book_id: u16, page_num: u16) -> Result<bool> {
        let _g = self.dir_lock.lock().unwrap();
        let path = self.page_path(book_id, page_num);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow!(e)).with_context(|| format!("remove {}", path.display())),
        }
    }

    /// Удалить все страницы книги.
    pub fn clear_book(&self, book_id: u16) -> Result<u32> {
        let _g = self.dir_lock.lock().unwrap();
        let n = self.delete_book_matching(book_id, |_, _| true)?;
        log::info!("cleared book cache: book={:04x}, deleted {} pages", book_id, n);
        Ok(n)
    }

    /// Удалить все страницы всех книг. Файлы вне грамматики имён не
    /// трогаются.
    pub fn clear_all(&self) -> Result<u32> {
        let _g = self.dir_lock.lock().unwrap();
        let mut deleted = 0u32;
        for entry in self.read_dir_or_empty()? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if parse_page_file_name(name).is_none() {
                continue;
            }
            if fs::remove_file(entry.path()).is_ok() {
                deleted += 1;
            }
        }
        log::info!("cleared all cache, deleted {} pages", deleted);
        Ok(deleted)
    }

    /// Посчитать статистику: число полных страниц, суммарный размер всех
    /// файлов кэша и свободное место файловой системы.
    pub fn stats(&self) -> Result<CacheStats> {
        let _g = self.dir_lock.lock().unwrap();
        let mut stats = CacheStats::default();
        for entry in self.read_dir_or_empty()? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if parse_page_file_name(name).is_none() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            stats.total_bytes += meta.len();
            if meta.len() == PAGE_BITMAP_SIZE as u64 {
                stats.cached_pages += 1;
            }
        }
        stats.free_bytes = fs2::available_space(&self.root).ok();
        Ok(stats)
    }

    // --------------------------- внутренности ---------------------------

    /// read_dir, в котором отсутствие каталога равно пустому перечислению.
    fn read_dir_or_empty(&self) -> Result<impl Iterator<Item = std::io::Result<fs::DirEntry>>> {
        match fs::read_dir(&self.root) {
            Ok(rd) => Ok(Some(rd).into_iter().flatten()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(None::<fs::ReadDir>.into_iter().flatten())
            }
            Err(e) => {
                Err(anyhow!(e)).with_context(|| format!("read dir {}", self.root.display()))
            }
        }
    }

    /// Свёртка по страницам одной книги: f(acc, page_num, file_len).
    fn fold_book_pages<T>(
        &self,
        book_id: u16,
        init: T,
        f: impl Fn(T, u16, u64) -> T,
    ) -> Result<T> {
        let mut acc = init;
        for entry in self.read_dir_or_empty()? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((book, page)) = parse_page_file_name(name) else {
                continue;
            };
            if book != book_id {
                continue;
            }
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if len != PAGE_BITMAP_SIZE as u64 {
                // Неполные файлы не участвуют в min/max
                continue;
            }
            acc = f(acc, page, len);
        }
        Ok(acc)
    }

    /// Удалить файлы книги, для которых предикат(page, len) истинен.
    fn delete_book_matching(
        &self,
        book_id: u16,
        pred: impl Fn(u16, u64) -> bool,
    ) -> Result<u32> {
        let mut deleted = 0u32;
        for entry in self.read_dir_or_empty()? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((book, page)) = parse_page_file_name(name) else {
                continue;
            };
            if book != book_id {
                continue;
            }
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if !pred(page, len) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    deleted += 1;
                    log::debug!("removed cached page: book={:04x}, page={}", book, page);
                }
                Err(e) => {
                    // Неудавшееся удаление не фатально: следующий проход повторит.
                    log::warn!("failed to remove {}: {}", entry.path().display(), e);
                }
            }
        }
        Ok(deleted)
    }
}
