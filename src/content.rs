// Content of the two buffers: text, artwork and the locally ticked progress readout.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::mpsc;
use futures::future::{join_all, AbortHandle, Abortable};
use futures::FutureExt;

use crate::host::SharedHost;
use crate::skin::Skin;
use crate::types::{format_clock, BufferId, Component, PlaybackSnapshot, Target};

const IMAGE_COMPONENTS: [Component; 2] = [Component::Cover, Component::Background];

struct Ticker {
    abort: AbortHandle,
    done: Rc<Cell<bool>>,
}

#[derive(Default)]
struct BufferContent {
    image_url: Option<String>,
    ticker: Option<Ticker>,
}

/// Writes snapshot content into buffers. Exactly one progress ticker per buffer.
pub struct ContentSync {
    host: SharedHost,
    skin: Rc<Skin>,
    badge: String,
    tick_interval_ms: u32,
    buffers: RefCell<[BufferContent; 2]>,
    finished: Rc<RefCell<Vec<mpsc::UnboundedSender<BufferId>>>>,
}

impl ContentSync {
    pub fn new(host: SharedHost, skin: Rc<Skin>, badge: &str, tick_interval_ms: u32) -> Self {
        ContentSync {
            host,
            skin,
            badge: badge.to_string(),
            tick_interval_ms: tick_interval_ms.max(1),
            buffers: RefCell::new([BufferContent::default(), BufferContent::default()]),
            finished: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Receives the buffer id whenever a ticker reaches the end of its track.
    pub fn subscribe_finished(&self) -> mpsc::UnboundedReceiver<BufferId> {
        let (tx, rx) = mpsc::unbounded();
        let mut listeners = self.finished.borrow_mut();
        listeners.retain(|tx| !tx.is_closed());
        listeners.push(tx);
        rx
    }

    /// Writes every field of `snapshot` into `buffer`. Artwork is only swapped when its
    /// URL changed; the call completes once new artwork loaded or fell back.
    /// Returns false when artwork failed to load and the placeholder is showing.
    pub async fn populate(&self, buffer: BufferId, snapshot: &PlaybackSnapshot) -> bool {
        let meta = &snapshot.metadata;
        self.write_text(buffer, Component::TrackName, &meta.title);
        self.write_text(buffer, Component::ArtistName, &meta.artist_line());
        self.write_text(buffer, Component::TotalTime, &format_clock(snapshot.duration_ms));
        self.write_text(buffer, Component::Badge, &self.badge);
        render_progress(
            &self.host,
            &self.skin,
            buffer,
            snapshot.progress_ms,
            snapshot.duration_ms,
        );

        let url = meta.artwork_url.clone();
        let changed = {
            let mut buffers = self.buffers.borrow_mut();
            let slot = &mut buffers[buffer.index()];
            if slot.image_url == url {
                false
            } else {
                slot.image_url = url.clone();
                true
            }
        };
        if !changed {
            return true;
        }

        let loads: Vec<_> = IMAGE_COMPONENTS
            .into_iter()
            .filter(|c| self.skin.contains(*c))
            .map(|c| self.host.load_image(Target::new(buffer, c), url.as_deref()))
            .collect();
        let results = join_all(loads).await;
        if url.is_some() && results.iter().any(|ok| !ok) {
            tracing::debug!(%buffer, url = ?url, "artwork failed to load, placeholder shown");
            return false;
        }
        true
    }

    /// Updates only the fields that move while a track plays.
    pub fn sync_progress(&self, buffer: BufferId, snapshot: &PlaybackSnapshot) {
        render_progress(
            &self.host,
            &self.skin,
            buffer,
            snapshot.progress_ms,
            snapshot.duration_ms,
        );
    }

    /// Ticks the progress readout from `snapshot.progress_ms` as of `anchor_ms` (host
    /// time of the poll) plus elapsed time. Replaces any ticker already on `buffer`.
    pub fn start_ticking(&self, buffer: BufferId, snapshot: &PlaybackSnapshot, anchor_ms: f64) {
        self.stop_ticking(buffer);
        if !snapshot.is_playing || snapshot.duration_ms == 0 {
            return;
        }

        let (abort, registration) = AbortHandle::new_pair();
        let done = Rc::new(Cell::new(false));
        let host = self.host.clone();
        let skin = self.skin.clone();
        let listeners = self.finished.clone();
        let interval = self.tick_interval_ms;
        let base = snapshot.progress_ms;
        let duration = snapshot.duration_ms;
        let finished = done.clone();

        let task = async move {
            loop {
                host.sleep(interval).await;
                let elapsed = (host.now_ms() - anchor_ms).max(0.0) as u64;
                let progress = base.saturating_add(elapsed).min(duration);
                render_progress(&host, &skin, buffer, progress, duration);
                if progress >= duration {
                    tracing::debug!(%buffer, "track likely finished");
                    for tx in listeners.borrow().iter() {
                        let _ = tx.unbounded_send(buffer);
                    }
                    break;
                }
            }
            finished.set(true);
        };
        self.host
            .spawn(Abortable::new(task, registration).map(|_| ()).boxed_local());

        self.buffers.borrow_mut()[buffer.index()].ticker = Some(Ticker { abort, done });
    }

    pub fn stop_ticking(&self, buffer: BufferId) {
        if let Some(ticker) = self.buffers.borrow_mut()[buffer.index()].ticker.take() {
            ticker.abort.abort();
        }
    }

    pub fn is_ticking(&self, buffer: BufferId) -> bool {
        self.buffers.borrow()[buffer.index()]
            .ticker
            .as_ref()
            .is_some_and(|t| !t.done.get() && !t.abort.is_aborted())
    }

    /// Empties a buffer and stops its ticker. Only ever applied to the passive buffer.
    pub fn clear(&self, buffer: BufferId) {
        self.stop_ticking(buffer);
        for component in [
            Component::TrackName,
            Component::ArtistName,
            Component::CurrentTime,
            Component::TotalTime,
            Component::Badge,
        ] {
            self.write_text(buffer, component, "");
        }
        if self.skin.contains(Component::ProgressBar) {
            self.host
                .set_progress(Target::new(buffer, Component::ProgressBar), 0.0);
        }

        let had_image = self.buffers.borrow_mut()[buffer.index()].image_url.take().is_some();
        if had_image {
            for component in IMAGE_COMPONENTS.into_iter().filter(|c| self.skin.contains(*c)) {
                let reset = self.host.load_image(Target::new(buffer, component), None);
                self.host.spawn(reset.map(|_| ()).boxed_local());
            }
        }
    }

    fn write_text(&self, buffer: BufferId, component: Component, text: &str) {
        if self.skin.contains(component) {
            self.host.set_text(Target::new(buffer, component), text);
        }
    }
}

fn render_progress(
    host: &SharedHost,
    skin: &Skin,
    buffer: BufferId,
    progress_ms: u64,
    duration_ms: u64,
) {
    if skin.contains(Component::CurrentTime) {
        host.set_text(
            Target::new(buffer, Component::CurrentTime),
            &format_clock(progress_ms),
        );
    }
    if skin.contains(Component::ProgressBar) {
        let fraction = if duration_ms == 0 {
            0.0
        } else {
            (progress_ms as f64 / duration_ms as f64).clamp(0.0, 1.0) as f32
        };
        host.set_progress(Target::new(buffer, Component::ProgressBar), fraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{track, Harness};

    fn content(h: &Harness) -> ContentSync {
        ContentSync::new(h.shared(), Rc::new(Skin::card()), "Now playing", 1000)
    }

    #[test]
    fn populate_writes_fields_and_waits_for_artwork() {
        let mut h = Harness::new();
        h.host.image_delay_ms.set(250);
        let sync = Rc::new(content(&h));
        let done = Rc::new(Cell::new(false));

        let (s, d) = (sync.clone(), done.clone());
        h.spawn(async move {
            s.populate(BufferId::B, &track("t2", 61_000, 200_000)).await;
            d.set(true);
        });
        h.run();
        assert_eq!(h.host.text(BufferId::B, Component::TrackName).as_deref(), Some("Title t2"));
        assert_eq!(h.host.text(BufferId::B, Component::ArtistName).as_deref(), Some("Artist t2"));
        assert_eq!(h.host.text(BufferId::B, Component::CurrentTime).as_deref(), Some("1:01"));
        assert_eq!(h.host.text(BufferId::B, Component::TotalTime).as_deref(), Some("3:20"));
        assert_eq!(
            h.host.image(BufferId::B, Component::Cover).as_deref(),
            Some("https://img.test/t2.jpg")
        );
        assert!(!done.get(), "populate waits for the image");

        h.advance(250);
        assert!(done.get());
    }

    #[test]
    fn unchanged_artwork_is_not_reloaded() {
        let mut h = Harness::new();
        let sync = Rc::new(content(&h));
        let s = sync.clone();
        h.spawn(async move {
            s.populate(BufferId::A, &track("t1", 0, 1000)).await;
            s.populate(BufferId::A, &track("t1", 500, 1000)).await;
        });
        h.run();
        // Cover and background once each.
        assert_eq!(h.host.image_loads.get(), 2);
    }

    #[test]
    fn ticking_advances_from_poll_time_and_signals_the_end() {
        let mut h = Harness::new();
        let sync = content(&h);
        let mut finished = sync.subscribe_finished();

        sync.start_ticking(BufferId::A, &track("t1", 57_000, 60_000), 0.0);
        assert!(sync.is_ticking(BufferId::A));

        h.advance(1000);
        assert_eq!(h.host.text(BufferId::A, Component::CurrentTime).as_deref(), Some("0:58"));

        h.advance(2000);
        assert_eq!(h.host.text(BufferId::A, Component::CurrentTime).as_deref(), Some("1:00"));
        assert!(!sync.is_ticking(BufferId::A));
        assert_eq!(finished.try_recv().unwrap(), BufferId::A);
        assert_eq!(
            h.host
                .progress
                .borrow()
                .get(&Target::new(BufferId::A, Component::ProgressBar))
                .copied(),
            Some(1.0)
        );
    }

    #[test]
    fn broken_artwork_falls_back_and_completes() {
        let mut h = Harness::new();
        h.host.image_delay_ms.set(100);
        let sync = Rc::new(content(&h));
        let loaded = Rc::new(Cell::new(None));

        let mut snapshot = track("t3", 0, 90_000);
        snapshot.metadata.artwork_url = Some("https://img.test/broken.jpg".into());
        let (s, l) = (sync.clone(), loaded.clone());
        h.spawn(async move { l.set(Some(s.populate(BufferId::A, &snapshot).await)) });
        h.run();
        assert_eq!(loaded.get(), None);

        h.advance(100);
        assert_eq!(loaded.get(), Some(false));
        assert_eq!(h.host.text(BufferId::A, Component::TrackName).as_deref(), Some("Title t3"));
        assert_eq!(
            h.host.image(BufferId::A, Component::Cover).as_deref(),
            Some("https://img.test/broken.jpg")
        );

        // Same broken URL again is not retried.
        let (s, l) = (sync.clone(), loaded.clone());
        let again = {
            let mut snapshot = track("t3", 1000, 90_000);
            snapshot.metadata.artwork_url = Some("https://img.test/broken.jpg".into());
            snapshot
        };
        h.spawn(async move { l.set(Some(s.populate(BufferId::A, &again).await)) });
        h.run();
        assert_eq!(loaded.get(), Some(true));
        assert_eq!(h.host.image_loads.get(), 2);
    }

    #[test]
    fn subscribers_joining_mid_track_hear_the_end() {
        let mut h = Harness::new();
        let sync = content(&h);
        let early = sync.subscribe_finished();
        drop(early);

        sync.start_ticking(BufferId::A, &track("t1", 58_000, 60_000), 0.0);
        h.advance(1000);
        let mut late = sync.subscribe_finished();
        assert_eq!(sync.finished.borrow().len(), 1, "closed receivers are pruned");

        h.advance(1000);
        assert_eq!(late.try_recv().unwrap(), BufferId::A);
    }

    #[test]
    fn restarting_replaces_the_ticker() {
        let mut h = Harness::new();
        let sync = content(&h);
        sync.start_ticking(BufferId::A, &track("t1", 0, 600_000), 0.0);
        h.advance(1000);
        sync.start_ticking(BufferId::A, &track("t1", 120_000, 600_000), 1000.0);
        h.advance(1000);
        assert_eq!(h.host.text(BufferId::A, Component::CurrentTime).as_deref(), Some("2:01"));
        h.advance(5000);
        assert_eq!(h.host.text(BufferId::A, Component::CurrentTime).as_deref(), Some("2:06"));
    }

    #[test]
    fn paused_snapshot_does_not_tick() {
        let h = Harness::new();
        let sync = content(&h);
        let mut paused = track("t1", 0, 1000);
        paused.is_playing = false;
        sync.start_ticking(BufferId::A, &paused, 0.0);
        assert!(!sync.is_ticking(BufferId::A));
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut h = Harness::new();
        let sync = Rc::new(content(&h));
        let s = sync.clone();
        h.spawn(async move {
            s.populate(BufferId::A, &track("t1", 0, 1000)).await;
        });
        h.run();
        sync.start_ticking(BufferId::A, &track("t1", 0, 100_000), 0.0);

        sync.clear(BufferId::A);
        h.run();
        assert!(!sync.is_ticking(BufferId::A));
        assert_eq!(h.host.text(BufferId::A, Component::TrackName).as_deref(), Some(""));
        assert_eq!(h.host.image(BufferId::A, Component::Cover), None);

        // Same artwork after a clear is loaded again.
        let s = sync.clone();
        h.spawn(async move {
            s.populate(BufferId::A, &track("t1", 0, 1000)).await;
        });
        h.run();
        assert_eq!(
            h.host.image(BufferId::A, Component::Cover).as_deref(),
            Some("https://img.test/t1.jpg")
        );
    }

    #[test]
    fn skin_without_slots_skips_them() {
        let mut h = Harness::new();
        let sync = Rc::new(ContentSync::new(h.shared(), Rc::new(Skin::circle()), "x", 1000));
        let s = sync.clone();
        h.spawn(async move {
            s.populate(BufferId::A, &track("t1", 0, 1000)).await;
        });
        h.run();
        assert_eq!(h.host.text(BufferId::A, Component::Badge), None);
        assert_eq!(h.host.text(BufferId::A, Component::TotalTime), None);
        assert!(h.host.text(BufferId::A, Component::TrackName).is_some());
    }
}
