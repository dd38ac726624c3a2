//! In-process subscriptions for page-ready events.
//!
//! Scope:
//! - Local (in-process) pub/sub: the reassembler publishes an event after a
//!   page file is closed and safe to reopen for reading.
//! - Subscribe for one book or for all books; drop of SubscriptionHandle
//!   unsubscribes.
//!
//! Notes:
//! - Callbacks are executed synchronously on the RX path right after the
//!   page is durable. Keep callbacks fast and non-blocking.
//! - The registry is intended to be owned by PageCache (one per cache).
//! - This module does NOT depend on disk formats and can be reused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// A page-ready event: the page file for (book_id, page_num) is complete
/// and readable through the store.
#[derive(Clone, Copy, Debug)]
pub struct PageReady {
    pub book_id: u16,
    pub page_num: u16,
}

type Callback = Arc<dyn Fn(&PageReady) + Send + Sync + 'static>;

#[derive(Default)]
struct SubInner {
    next_id: u64,
    subs: HashMap<u64, (Option<u16>, Callback)>, // id -> (book filter, cb)
}

/// Subscription registry (to be held inside PageCache).
pub struct SubRegistry {
    inner: Mutex<SubInner>,
}

impl SubRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SubInner::default()),
        })
    }

    /// Subscribe for events of one book (`Some(book_id)`) or all (`None`).
    /// Returns a handle; dropping it unsubscribes.
    pub fn subscribe(self: &Arc<Self>, book: Option<u16>, cb: Callback) -> SubscriptionHandle {
        let mut g = self.inner.lock().unwrap();
        let id = g.next_id;
        g.next_id = g.next_id.wrapping_add(1);
        g.subs.insert(id, (book, cb));
        drop(g);
        SubscriptionHandle {
            id,
            reg: Arc::downgrade(self),
        }
    }

    /// Publish an event to all subscribers whose filter matches.
    pub fn publish(&self, ev: &PageReady) {
        let callbacks: Vec<Callback> = {
            let g = self.inner.lock().unwrap();
            g.subs
                .values()
                .filter_map(|(book, cb)| match book {
                    Some(b) if *b != ev.book_id => None,
                    _ => Some(cb.clone()),
                })
                .collect()
        };
        // Execute outside the lock
        for cb in callbacks {
            cb(ev);
        }
    }

    /// Unsubscribe by id (best-effort).
    fn unsubscribe(&self, id: u64) {
        let mut g = self.inner.lock().unwrap();
        g.subs.remove(&id);
    }
}

/// RAII handle: unsubscribes on drop.
pub struct SubscriptionHandle {
    id: u64,
    reg: Weak<SubRegistry>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(reg) = self.reg.upgrade() {
            reg.unsubscribe(self.id);
        }
    }
}

/// Public helper for building callbacks.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&PageReady) + Send + Sync + 'static,
{
    Arc::new(f)
}
