use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, time::Duration};
use tracing::{debug, info};

/// Opaque handle that only the audio sink knows how to open.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayableRef(String);

impl PlayableRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PlayableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlayableRef(..)")
    }
}

/// A playable item with the metadata needed to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub author: Option<String>,
    /// `None` for live streams.
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub requested_by: Option<u64>,
    pub source: PlayableRef,
}

impl Track {
    pub fn new(title: impl Into<String>, source: PlayableRef) -> Self {
        Self {
            title: title.into(),
            author: None,
            duration: None,
            thumbnail: None,
            requested_by: None,
            source,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn requested_by(mut self, user_id: u64) -> Self {
        self.requested_by = Some(user_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub track: Track,
    pub added_at: DateTime<Utc>,
}

impl From<Track> for QueueItem {
    fn from(track: Track) -> Self {
        Self {
            track,
            added_at: Utc::now(),
        }
    }
}

/// Whether clearing the queue also turns repeat off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearMode {
    #[default]
    KeepLoop,
    ResetLoop,
}

#[derive(Debug)]
struct MusicQueue {
    items: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    loop_enabled: bool,
    volume: u8,
}

/// Pending tracks, the now-playing slot and playback settings of one session.
///
/// Every operation takes the internal lock exactly once, so callers never
/// observe `current` and the pending list out of step with each other.
#[derive(Debug)]
pub struct QueueStore {
    inner: RwLock<MusicQueue>,
}

impl QueueStore {
    pub fn new(volume: u8) -> Self {
        Self {
            inner: RwLock::new(MusicQueue {
                items: VecDeque::new(),
                current: None,
                loop_enabled: false,
                volume: volume.min(100),
            }),
        }
    }

    /// Agrega un track al final y devuelve su posición (0 = siguiente)
    pub fn enqueue(&self, track: Track) -> usize {
        let mut queue = self.inner.write();
        let position = queue.items.len();
        info!("➕ Agregado a la cola: {} (posición {})", track.title, position);
        queue.items.push_back(QueueItem::from(track));
        position
    }

    /// Obtiene el siguiente track (FIFO, o el mismo si el loop está activo)
    pub fn advance(&self) -> Option<Track> {
        let mut queue = self.inner.write();

        if queue.loop_enabled {
            if let Some(current) = &queue.current {
                info!("🔂 Repitiendo track: {}", current.track.title);
                return Some(current.track.clone());
            }
        }

        queue.current = queue.items.pop_front();
        match &queue.current {
            Some(item) => {
                info!("➡️ Siguiente en cola (FIFO): {}", item.track.title);
                Some(item.track.clone())
            }
            None => {
                info!("📭 Cola vacía, no hay siguiente track");
                None
            }
        }
    }

    /// Suelta el track actual sin tocar la cola pendiente
    pub fn discard_current(&self) -> Option<Track> {
        self.inner.write().current.take().map(|item| item.track)
    }

    /// Limpia la cola y el track actual
    pub fn clear(&self, mode: ClearMode) {
        let mut queue = self.inner.write();
        let cleared = queue.items.len();
        queue.items.clear();
        queue.current = None;
        if mode == ClearMode::ResetLoop {
            queue.loop_enabled = false;
        }
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
    }

    /// Mezcla la cola pendiente; el track actual no se toca
    pub fn shuffle(&self) -> usize {
        let mut queue = self.inner.write();
        let mut rng = rand::thread_rng();
        queue.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} tracks)", queue.items.len());
        queue.items.len()
    }

    pub fn set_loop(&self, enabled: bool) {
        self.inner.write().loop_enabled = enabled;
        if enabled {
            info!("🔂 Repetir canción activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
    }

    /// Activa/desactiva loop y devuelve el nuevo valor
    pub fn toggle_loop(&self) -> bool {
        let enabled = {
            let mut queue = self.inner.write();
            queue.loop_enabled = !queue.loop_enabled;
            queue.loop_enabled
        };
        debug!("loop alternado a {}", enabled);
        enabled
    }

    pub fn set_volume(&self, volume: u8) {
        debug_assert!(volume <= 100);
        self.inner.write().volume = volume.min(100);
    }

    pub fn volume(&self) -> u8 {
        self.inner.read().volume
    }

    pub fn is_loop(&self) -> bool {
        self.inner.read().loop_enabled
    }

    pub fn current(&self) -> Option<Track> {
        self.inner.read().current.as_ref().map(|item| item.track.clone())
    }

    pub fn has_current(&self) -> bool {
        self.inner.read().current.is_some()
    }

    /// Tracks pendientes, sin contar el actual
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Verifica si no hay nada pendiente ni sonando
    pub fn is_empty(&self) -> bool {
        let queue = self.inner.read();
        queue.items.is_empty() && queue.current.is_none()
    }

    /// Vista consistente de la cola para mostrarla
    pub fn snapshot(&self) -> QueueInfo {
        let queue = self.inner.read();
        let total_duration = queue
            .items
            .iter()
            .chain(queue.current.iter())
            .filter_map(|item| item.track.duration)
            .sum();

        QueueInfo {
            current: queue.current.clone(),
            items: queue.items.iter().cloned().collect(),
            total_items: queue.items.len(),
            loop_enabled: queue.loop_enabled,
            volume: queue.volume,
            total_duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    pub current: Option<QueueItem>,
    pub items: Vec<QueueItem>,
    pub total_items: usize,
    pub loop_enabled: bool,
    pub volume: u8,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola (empezando en 1)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());
        let total_pages = self.total_items.div_ceil(items_per_page).max(1);

        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start,
            current_page: safe_page,
            total_pages,
            remaining: self.items.len().saturating_sub(end.max(start)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<QueueItem>,
    /// 0-based queue position of `items[0]`.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    /// Tracks after this page.
    pub remaining: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, thread};

    fn track(title: &str) -> Track {
        Track::new(title, PlayableRef::new(format!("ref:{title}")))
            .with_duration(Duration::from_secs(60))
    }

    fn titles(info: &QueueInfo) -> Vec<String> {
        info.items.iter().map(|i| i.track.title.clone()).collect()
    }

    #[test]
    fn test_enqueue_returns_pending_position() {
        let store = QueueStore::new(50);
        assert_eq!(store.enqueue(track("a")), 0);
        assert_eq!(store.enqueue(track("b")), 1);

        store.advance();
        // el actual no cuenta como posición pendiente
        assert_eq!(store.enqueue(track("c")), 1);
    }

    #[test]
    fn test_advance_is_fifo_without_loop() {
        let store = QueueStore::new(50);
        for name in ["a", "b", "c"] {
            store.enqueue(track(name));
            let _ = store.snapshot();
        }

        let played: Vec<String> = std::iter::from_fn(|| store.advance())
            .map(|t| t.title)
            .collect();

        assert_eq!(played, vec!["a", "b", "c"]);
        assert!(store.current().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_loop_repeats_current_and_keeps_queue() {
        let store = QueueStore::new(50);
        store.enqueue(track("a"));
        store.enqueue(track("b"));
        store.advance();
        store.set_loop(true);

        for _ in 0..5 {
            assert_eq!(store.advance().map(|t| t.title), Some("a".to_string()));
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_loop_without_current_pops_head() {
        let store = QueueStore::new(50);
        store.set_loop(true);
        store.enqueue(track("a"));

        assert_eq!(store.advance().map(|t| t.title), Some("a".to_string()));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_discard_current_breaks_loop_for_next_advance() {
        let store = QueueStore::new(50);
        store.enqueue(track("a"));
        store.enqueue(track("b"));
        store.set_loop(true);
        store.advance();

        assert_eq!(store.discard_current().map(|t| t.title), Some("a".into()));
        assert_eq!(store.advance().map(|t| t.title), Some("b".into()));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = QueueStore::new(70);
        store.enqueue(track("a"));
        store.enqueue(track("b"));
        store.advance();
        store.set_loop(true);

        store.clear(ClearMode::KeepLoop);
        let once = store.snapshot();
        store.clear(ClearMode::KeepLoop);
        let twice = store.snapshot();

        assert_eq!(once, twice);
        assert!(once.current.is_none());
        assert!(once.items.is_empty());
        assert!(once.loop_enabled);
        assert_eq!(once.volume, 70);
    }

    #[test]
    fn test_clear_can_reset_loop() {
        let store = QueueStore::new(50);
        store.set_loop(true);
        store.clear(ClearMode::ResetLoop);
        assert!(!store.is_loop());
    }

    #[test]
    fn test_shuffle_keeps_items_and_current() {
        let store = QueueStore::new(50);
        for i in 0..20 {
            store.enqueue(track(&i.to_string()));
        }
        store.advance();

        assert_eq!(store.shuffle(), 19);

        let info = store.snapshot();
        assert_eq!(
            info.current.as_ref().map(|c| c.track.title.clone()),
            Some("0".to_string())
        );
        let mut shuffled = titles(&info);
        shuffled.sort();
        let mut expected: Vec<String> = (1..20).map(|i| i.to_string()).collect();
        expected.sort();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn test_concurrent_enqueue_never_loses_items() {
        let store = Arc::new(QueueStore::new(50));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        store.enqueue(track(&format!("{worker}-{i}")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_snapshot_reports_total_duration() {
        let store = QueueStore::new(50);
        store.enqueue(track("a"));
        store.enqueue(Track::new("live", PlayableRef::new("live")));
        store.enqueue(track("b"));
        store.advance();

        let info = store.snapshot();
        assert_eq!(info.total_items, 2);
        assert_eq!(info.total_duration, Duration::from_secs(120));
    }

    #[test]
    fn test_page_splits_pending_items() {
        let store = QueueStore::new(50);
        for i in 0..25 {
            store.enqueue(track(&i.to_string()));
        }
        let info = store.snapshot();

        let first = info.page(1, 10);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.remaining, 15);

        let last = info.page(3, 10);
        assert_eq!(last.first_position, 20);
        assert_eq!(last.items.len(), 5);
        assert_eq!(last.remaining, 0);

        assert!(info.page(9, 10).items.is_empty());
    }

    #[test]
    fn test_playable_ref_debug_is_opaque() {
        let source = PlayableRef::new("https://secret.example/stream?token=abc");
        assert_eq!(format!("{source:?}"), "PlayableRef(..)");
        assert_eq!(source.as_str(), "https://secret.example/stream?token=abc");
    }
}
