// Poll loop: fetch, normalize, hand to the state machine, sleep an adaptive interval.
// Transport and parse failures never escape; they become synthetic "not playing" snapshots.

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::mpsc;
use futures::future::{select, AbortHandle, Abortable, Either};
use futures::{FutureExt, StreamExt};
use serde::Deserialize;

use crate::config::PollSettings;
use crate::error::EngineError;
use crate::host::{PollSource, SharedHost};
use crate::machine::{Decision, TransitionStateMachine};
use crate::types::{BufferId, PlaybackSnapshot, TrackMetadata};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlayback {
    is_playing: Option<bool>,
    progress_ms: Option<u64>,
    duration_ms: Option<u64>,
    track_id: Option<String>,
    track_name: Option<String>,
    artist_name: Option<String>,
    album_name: Option<String>,
    image_url: Option<String>,
    item: Option<RawItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawItem {
    id: Option<String>,
    name: Option<String>,
    duration_ms: Option<u64>,
    artists: Vec<RawArtist>,
    album: Option<RawAlbum>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawArtist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAlbum {
    name: Option<String>,
    images: Vec<RawImage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawImage {
    url: Option<String>,
}

/// Parses a poll response body. Accepts the Spotify `currently-playing` shape and a
/// flat `{track_name, artist_name, ...}` shape. An empty body (HTTP 204) means
/// nothing is playing.
pub fn parse_snapshot(body: &str) -> Result<PlaybackSnapshot, EngineError> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(PlaybackSnapshot::not_playing());
    }
    let raw: RawPlayback =
        serde_json::from_str(body).map_err(|e| EngineError::DataShape(e.to_string()))?;

    let item = raw.item.unwrap_or_default();
    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
    let track_id = non_empty(item.id)
        .or_else(|| non_empty(raw.track_id))
        .or_else(|| non_empty(item.name.clone()))
        .or_else(|| non_empty(raw.track_name.clone()));

    let mut artists: Vec<String> = item
        .artists
        .into_iter()
        .map(|a| a.name)
        .filter(|name| !name.is_empty())
        .collect();
    if artists.is_empty() {
        artists.extend(raw.artist_name);
    }

    let album = item.album.unwrap_or_default();
    let artwork_url = album
        .images
        .into_iter()
        .find_map(|image| image.url)
        .or(raw.image_url);

    let duration_ms = item.duration_ms.or(raw.duration_ms).unwrap_or(0);
    let mut progress_ms = raw.progress_ms.unwrap_or(0);
    if duration_ms > 0 {
        progress_ms = progress_ms.min(duration_ms);
    }

    Ok(PlaybackSnapshot {
        is_playing: raw.is_playing.unwrap_or(false) && track_id.is_some(),
        track_id,
        progress_ms,
        duration_ms,
        metadata: TrackMetadata {
            title: item.name.or(raw.track_name).unwrap_or_default(),
            artists,
            album: album.name.or(raw.album_name),
            artwork_url,
        },
        error: None,
    })
}

/// Milliseconds until the next poll after `snapshot`.
pub fn next_delay(settings: &PollSettings, snapshot: &PlaybackSnapshot) -> u32 {
    let delay = if snapshot.error.is_some() {
        settings.error_backoff_ms
    } else if !snapshot.has_track() {
        settings.idle_interval_ms
    } else {
        let remaining = snapshot.duration_ms.saturating_sub(snapshot.progress_ms);
        let interval = settings.interval_ms as u64;
        if snapshot.duration_ms > 0 && remaining < interval {
            // Catch the next track right after this one ends.
            (remaining + settings.end_slack_ms as u64).min(interval) as u32
        } else {
            settings.interval_ms
        }
    };
    delay.max(settings.min_interval_ms)
}

/// Like `next_delay`, but a snapshot the state machine dropped says nothing about
/// what is on screen, so the next poll comes as soon as allowed.
pub fn delay_after(
    settings: &PollSettings,
    snapshot: &PlaybackSnapshot,
    decision: Decision,
) -> u32 {
    match decision {
        Decision::Drop => settings.min_interval_ms.min(settings.interval_ms).max(1),
        _ => next_delay(settings, snapshot),
    }
}

/// Drives one widget from a poll source.
pub struct PollLoop {
    host: SharedHost,
    source: Rc<dyn PollSource>,
    machine: Rc<TransitionStateMachine>,
    settings: PollSettings,
    abort: RefCell<Option<AbortHandle>>,
}

impl PollLoop {
    pub fn new(
        host: SharedHost,
        source: Rc<dyn PollSource>,
        machine: Rc<TransitionStateMachine>,
        settings: PollSettings,
    ) -> Self {
        PollLoop {
            host,
            source,
            machine,
            settings,
            abort: RefCell::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.abort
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_aborted())
    }

    /// Fetches once and dispatches the result. The decision is made in this turn;
    /// the phase it starts runs as its own task so the next poll is never delayed.
    pub async fn poll_once(&self) -> (PlaybackSnapshot, Decision) {
        let fetched = self.source.fetch().await;
        let snapshot = match fetched.and_then(|body| parse_snapshot(&body)) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if err.is_poll_failure() {
                    tracing::warn!(%err, "poll failed");
                } else {
                    tracing::error!(%err, "poll source misbehaved");
                }
                PlaybackSnapshot::failed(&err)
            }
        };
        tracing::debug!(track = ?snapshot.track_id, playing = snapshot.is_playing, "polled");

        let decision = self.machine.dispatch(snapshot.clone());
        (snapshot, decision)
    }

    /// Starts polling immediately. A running loop is restarted.
    pub fn start(self: &Rc<Self>) {
        self.stop();
        let mut finished = self.machine.content().subscribe_finished();
        let this = self.clone();
        let (abort, registration) = AbortHandle::new_pair();

        let task = async move {
            loop {
                let (snapshot, decision) = this.poll_once().await;
                let delay = delay_after(&this.settings, &snapshot, decision);
                this.wait(delay, &mut finished).await;
            }
        };
        self.host
            .spawn(Abortable::new(task, registration).map(|_| ()).boxed_local());
        *self.abort.borrow_mut() = Some(abort);
        tracing::info!(interval_ms = self.settings.interval_ms, "polling started");
    }

    pub fn stop(&self) {
        if let Some(handle) = self.abort.borrow_mut().take() {
            handle.abort();
            tracing::info!("polling stopped");
        }
    }

    /// Sleeps `delay_ms`, cut short when a ticker reports the track ran out.
    async fn wait(&self, delay_ms: u32, finished: &mut mpsc::UnboundedReceiver<BufferId>) {
        let sleep = self.host.sleep(delay_ms);
        match select(sleep, finished.next()).await {
            Either::Left(_) => {}
            Either::Right((Some(buffer), _)) => {
                tracing::debug!(%buffer, "track ran out, polling early");
                self.host.sleep(self.settings.end_slack_ms).await;
            }
            Either::Right((None, sleep)) => sleep.await,
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.abort.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WidgetConfig;
    use crate::content::ContentSync;
    use crate::preset::AnimationConfig;
    use crate::skin::Skin;
    use crate::testing::{track, Harness, ScriptedSource};
    use crate::types::{EnginePhase, StatusMessage};
    use proptest::prelude::*;

    const SPOTIFY: &str = r#"{
        "is_playing": true,
        "progress_ms": 42000,
        "currently_playing_type": "track",
        "item": {
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "duration_ms": 213573,
            "artists": [{"name": "Rick Astley"}, {"name": "Guest"}],
            "album": {
                "name": "Whenever You Need Somebody",
                "images": [
                    {"url": "https://i.scdn.co/image/640"},
                    {"url": "https://i.scdn.co/image/300"}
                ]
            }
        }
    }"#;

    #[test]
    fn parses_spotify_shape() {
        let snapshot = parse_snapshot(SPOTIFY).unwrap();
        assert!(snapshot.has_track());
        assert_eq!(snapshot.track_id.as_deref(), Some("4uLU6hMCjMI75M1A2tKUQC"));
        assert_eq!(snapshot.progress_ms, 42_000);
        assert_eq!(snapshot.duration_ms, 213_573);
        assert_eq!(snapshot.metadata.title, "Never Gonna Give You Up");
        assert_eq!(snapshot.metadata.artist_line(), "Rick Astley, Guest");
        assert_eq!(snapshot.metadata.album.as_deref(), Some("Whenever You Need Somebody"));
        assert_eq!(
            snapshot.metadata.artwork_url.as_deref(),
            Some("https://i.scdn.co/image/640")
        );
    }

    #[test]
    fn parses_flat_shape_keyed_by_name() {
        let snapshot = parse_snapshot(
            r#"{"is_playing":true,"track_name":"Song","artist_name":"Band","duration_ms":1000,"progress_ms":5000,"image_url":"https://x/y.png"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.track_id.as_deref(), Some("Song"));
        assert_eq!(snapshot.metadata.artists, vec!["Band".to_string()]);
        assert_eq!(snapshot.progress_ms, 1000, "progress is clamped to duration");
        assert_eq!(snapshot.metadata.artwork_url.as_deref(), Some("https://x/y.png"));
    }

    #[test]
    fn nothing_playing_shapes() {
        let bodies = [
            "",
            "  ",
            "null",
            r#"{"is_playing":false,"item":null}"#,
            r#"{"is_playing":true}"#,
        ];
        for body in bodies {
            let snapshot = parse_snapshot(body).unwrap();
            assert!(!snapshot.has_track(), "{body:?}");
            assert_eq!(snapshot.error, None);
        }
    }

    #[test]
    fn empty_ids_fall_back_to_names() {
        let local = parse_snapshot(
            r#"{"is_playing":true,"item":{"id":"","name":"Local file","duration_ms":1000}}"#,
        )
        .unwrap();
        assert_eq!(local.track_id.as_deref(), Some("Local file"));
        assert!(local.has_track());

        let flat =
            parse_snapshot(r#"{"is_playing":true,"track_id":"","track_name":"Song"}"#).unwrap();
        assert_eq!(flat.track_id.as_deref(), Some("Song"));
    }

    #[test]
    fn malformed_body_is_a_data_shape_error() {
        assert!(matches!(parse_snapshot("<html>"), Err(EngineError::DataShape(_))));
        assert!(matches!(
            parse_snapshot(r#"{"progress_ms":"soon"}"#),
            Err(EngineError::DataShape(_))
        ));
    }

    #[test]
    fn delay_adapts_to_state() {
        let settings = PollSettings::default();
        assert_eq!(next_delay(&settings, &track("t", 0, 200_000)), 5_000);
        assert_eq!(next_delay(&settings, &PlaybackSnapshot::not_playing()), 10_000);
        let failed = PlaybackSnapshot::failed(&EngineError::Transport("x".into()));
        assert_eq!(next_delay(&settings, &failed), 15_000);
        assert_eq!(next_delay(&settings, &track("t", 197_000, 200_000)), 3_750);
        assert_eq!(next_delay(&settings, &track("t", 200_000, 200_000)), 1_000);

        let stopped = PlaybackSnapshot::not_playing();
        assert_eq!(delay_after(&settings, &stopped, Decision::Drop), 1_000);
        assert_eq!(delay_after(&settings, &stopped, Decision::Outro), 10_000);
    }

    proptest! {
        #[test]
        fn delay_stays_within_bounds(progress in 0u64..400_000, duration in 0u64..400_000) {
            let settings = PollSettings::default();
            let delay = next_delay(&settings, &track("t", progress, duration));
            prop_assert!(delay >= settings.min_interval_ms);
            prop_assert!(delay <= settings.interval_ms);
        }
    }

    fn poll_loop(h: &Harness, source: Rc<ScriptedSource>) -> Rc<PollLoop> {
        poll_loop_with(h, source, PollSettings::default())
    }

    fn poll_loop_with(
        h: &Harness,
        source: Rc<ScriptedSource>,
        settings: PollSettings,
    ) -> Rc<PollLoop> {
        let skin = Rc::new(Skin::card());
        let config = WidgetConfig::default();
        let content = Rc::new(ContentSync::new(h.shared(), skin.clone(), "Now playing", 1000));
        let machine = Rc::new(TransitionStateMachine::new(
            h.shared(),
            skin.clone(),
            AnimationConfig::bake("fade-soft", &skin),
            content,
            config.messages,
        ));
        Rc::new(PollLoop::new(h.shared(), source, machine, settings))
    }

    #[test]
    fn loop_feeds_the_machine_and_backs_off_on_errors() {
        let mut h = Harness::new();
        let source = Rc::new(ScriptedSource::default());
        source.push(Ok(SPOTIFY));
        source.push(Err(EngineError::Transport("offline".into())));
        let poll = poll_loop(&h, source.clone());

        poll.start();
        h.run();
        assert_eq!(source.fetches.get(), 1);
        assert_eq!(poll.machine.state().phase, EnginePhase::Intro);

        h.advance(5_000);
        assert_eq!(source.fetches.get(), 2);
        assert!(matches!(*h.host.status.borrow(), Some(StatusMessage::Error(_))));

        h.advance(14_999);
        assert_eq!(source.fetches.get(), 2);
        h.advance(1);
        assert_eq!(source.fetches.get(), 3);
        assert_eq!(poll.machine.state().phase, EnginePhase::Idle);
    }

    #[test]
    fn dropped_snapshot_is_polled_again_soon() {
        let mut h = Harness::new();
        let source = Rc::new(ScriptedSource::default());
        source.push(Ok(SPOTIFY));
        source.push(Ok(""));
        let settings = PollSettings {
            interval_ms: 1_000,
            ..PollSettings::default()
        };
        let poll = poll_loop_with(&h, source.clone(), settings);

        poll.start();
        h.advance(1_000);
        // The stop arrived mid-intro and was dropped.
        assert_eq!(source.fetches.get(), 2);
        assert_eq!(poll.machine.state().phase, EnginePhase::Intro);

        h.advance(1_000);
        assert_eq!(source.fetches.get(), 3);
        assert_eq!(poll.machine.state().phase, EnginePhase::Outro);
    }

    #[test]
    fn polls_early_when_the_track_runs_out() {
        let mut h = Harness::new();
        let source = Rc::new(ScriptedSource::default());
        let poll = poll_loop(&h, source.clone());
        poll.start();
        h.run();
        assert_eq!(source.fetches.get(), 1);

        // Started elsewhere while the loop sleeps its idle interval.
        let machine = poll.machine.clone();
        h.spawn(async move {
            machine.on_snapshot(track("t1", 57_000, 60_000)).await;
        });
        h.advance(4_200);
        assert_eq!(source.fetches.get(), 1);
        h.advance(100);
        assert_eq!(source.fetches.get(), 2);
    }

    #[test]
    fn stop_cancels_pending_polls() {
        let mut h = Harness::new();
        let source = Rc::new(ScriptedSource::default());
        let poll = poll_loop(&h, source.clone());
        poll.start();
        h.run();
        assert!(poll.is_running());

        poll.stop();
        assert!(!poll.is_running());
        h.advance(60_000);
        assert_eq!(source.fetches.get(), 1);
    }
}
