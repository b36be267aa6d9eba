// One widget instance: skin, baked animations, state machine and poll loop wired
// to a host. Instances share nothing, so several widgets can live on one page.

use std::rc::Rc;

use futures::FutureExt;

use crate::config::WidgetConfig;
use crate::content::ContentSync;
use crate::error::EngineError;
use crate::host::{PollSource, SharedHost};
use crate::machine::{Decision, TransitionStateMachine};
use crate::poll::{parse_snapshot, PollLoop};
use crate::preset::{AnimationConfig, Preset};
use crate::skin::Skin;
use crate::types::{BufferId, EngineState, PlaybackSnapshot};

pub struct Widget {
    host: SharedHost,
    skin: Rc<Skin>,
    machine: Rc<TransitionStateMachine>,
    poll: Rc<PollLoop>,
}

impl Widget {
    /// Builds the widget and hides both buffers until the first track arrives.
    pub fn new(host: SharedHost, source: Rc<dyn PollSource>, config: WidgetConfig) -> Self {
        let skin = Rc::new(config.resolve_skin());
        Widget::with_skin(host, source, config, skin)
    }

    /// Like `new`, with a skin the caller already resolved from `config` and shares
    /// with its host.
    pub fn with_skin(
        host: SharedHost,
        source: Rc<dyn PollSource>,
        config: WidgetConfig,
        skin: Rc<Skin>,
    ) -> Self {
        let (animations, problems) = config.animation_config(&skin);
        if !problems.is_empty() {
            tracing::warn!(count = problems.len(), "stored animation config partly ignored");
        }

        let content = Rc::new(ContentSync::new(
            host.clone(),
            skin.clone(),
            &config.messages.badge,
            config.poll.tick_interval_ms,
        ));
        let machine = Rc::new(TransitionStateMachine::new(
            host.clone(),
            skin.clone(),
            animations,
            content,
            config.messages.clone(),
        ));
        let poll = Rc::new(PollLoop::new(
            host.clone(),
            source,
            machine.clone(),
            config.poll.clone(),
        ));

        host.set_buffer_inert(BufferId::A, true);
        host.set_buffer_inert(BufferId::B, true);
        host.set_container_inert(true);
        tracing::info!(skin = %skin.id, preset = %config.preset, "widget mounted");

        Widget {
            host,
            skin,
            machine,
            poll,
        }
    }

    pub fn start(&self) {
        self.poll.start();
    }

    pub fn stop(&self) {
        self.poll.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_running()
    }

    /// Feeds a snapshot obtained outside the poll loop.
    pub fn push_snapshot(&self, snapshot: PlaybackSnapshot) -> Decision {
        self.machine.dispatch(snapshot)
    }

    /// Like `push_snapshot`, from a raw poll body. A bad body is fed as a failed poll.
    pub fn push_json(&self, body: &str) {
        let snapshot = parse_snapshot(body).unwrap_or_else(|err| {
            tracing::warn!(%err, "pushed snapshot rejected");
            PlaybackSnapshot::failed(&err)
        });
        self.push_snapshot(snapshot);
    }

    pub fn replay_intro(&self) {
        let machine = self.machine.clone();
        self.host.spawn(
            async move {
                machine.replay_intro().await;
            }
            .boxed_local(),
        );
    }

    /// Re-bakes the animations with another preset. They apply from the next phase.
    pub fn set_preset(&self, preset_id: &str) -> Result<(), EngineError> {
        let preset = Preset::find(preset_id)?;
        self.machine
            .set_animation_config(AnimationConfig::bake(preset.id, &self.skin));
        tracing::info!(preset = preset.id, "preset changed");
        Ok(())
    }

    pub fn set_animation_config(&self, config: AnimationConfig) {
        self.machine.set_animation_config(config);
    }

    pub fn state(&self) -> EngineState {
        self.machine.state()
    }

    pub fn skin(&self) -> &Skin {
        &self.skin
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        self.poll.stop();
    }
}
