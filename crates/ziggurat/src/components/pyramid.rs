//! The pyramid game.
//!
//! A pyramid is a chat pattern where one speaker repeats a token once
//! more per line and then unwinds it symmetrically: `go`, `go go`,
//! `go go go`, `go go`, `go`. The engine watches every line, tracks the
//! rise and fall per channel, congratulates completed pyramids and rolls
//! against the channel's difficulty profile for a chance to interrupt an
//! ongoing one with an unsolicited pyramid fact. The bot's own fact line
//! echoes back as a speaker switch, which is what actually breaks the
//! pattern.
//!
//! # State machine
//!
//! Per channel: IDLE (level 0), BUILDING (level rising and equal to the
//! peak), SHRINKING (level falling from the peak). A pattern must reach
//! level 3 before a break scores as a loss or a return to level 1 scores
//! as a win. Transitions move the level by exactly one step while the
//! same speaker keeps the pattern going; anything else resets the
//! channel, caching the current line as the new starting point.
//!
//! Channels are fully independent; detection only runs where the game is
//! switched on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use ziggurat_framework::prelude::*;

use crate::store::{
    GameConfig, GameRecord, GameStore, OutcomeLog, ProfileStore, PyramidProfile,
    StoreError,
};
use crate::util::graph::sparkline;

/// A pattern shorter than this never scores.
const REQUIRED_PEAK: u32 = 3;

/// Uniform draw in `[0, 1)`, injectable for deterministic tests.
pub type RollFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Facts served when an interruption roll succeeds, seeded into every
/// newly-sighted channel's configuration.
pub const DEFAULT_FACTS: &[&str] = &[
    "In geometry, pyramids have triangular sides that come together at the top (apex).",
    "If they have 4 FACES, 3 SIDES AND A TRIANGULAR BASE, they are called a tetrahedron.",
    "Humans have been building structures using pyramid shapes for thousands of years.",
    "Ancient Egyptian pyramids are the most well known pyramid structures.",
    "Most Ancient Egyptian pyramids were built as tombs for Pharaohs and their families.",
    "Over 130 pyramids have been discovered in Egypt.",
    "The first Egyptian pyramid is believed to be the Pyramid of Djoser, it was built in Saqqara around 4650 years ago (2640 BC).",
    "The Great Pyramid of Giza is the oldest and largest of three pyramids in the Giza Necropolis.",
    "Most Aztec and Mayan pyramids were step pyramids with temples on top.",
    "Mayan pyramids date back to around 3000 years ago.",
    "The world's largest pyramid by volume is the Great Pyramid of Cholula in Puebla, Mexico.",
    "Sudan is home to a large number of Nubian pyramids which are smaller and steeper than those found in Egypt.",
    "The Roman Empire built a number of pyramids including the Pyramid of Cestius in Rome, Italy which still stands today.",
    "The Louvre in Paris is home to a large glass pyramid.",
    "The 30 story Luxor Hotel in Las Vegas is a large pyramid that holds over 4000 rooms.",
    "For over 3800 years, the Great Pyramid of Giza was the tallest man made structure in the world.",
    "Nearly all Egyptian Pyramids are located on the west bank of the Nile.",
    "The four faces of the Great Pyramid of Giza are slightly concave, the only pyramid to have been built this way.",
];

/// The difficulty curves shipped with the bot.
pub fn default_profiles() -> HashMap<String, PyramidProfile> {
    HashMap::from([
        (
            "kind".to_string(),
            PyramidProfile {
                up_base: 0.97,
                up_slope: 0.01,
                down_base: 0.85,
                down_slope: -0.03,
            },
        ),
        (
            "cruel".to_string(),
            PyramidProfile {
                up_base: 0.60,
                up_slope: -0.05,
                down_base: 0.50,
                down_slope: -0.08,
            },
        ),
    ])
}

/// Configuration seeded into channels on first sight: game off, kind
/// curve, stock facts.
pub fn default_config() -> GameConfig {
    GameConfig {
        active: false,
        profile: "kind".to_string(),
        facts: DEFAULT_FACTS.iter().map(|f| f.to_string()).collect(),
    }
}

#[derive(Default)]
struct ChannelState {
    last_user: String,
    last_message: String,
    token: String,
    level: u32,
    max_level: u32,
}

impl ChannelState {
    fn reset(&mut self, user: &str, message: &str) {
        self.last_user = user.to_string();
        self.last_message = message.to_string();
        self.token.clear();
        self.level = 0;
        self.max_level = 0;
    }
}

struct PyramidCore {
    profiles: RwLock<HashMap<String, PyramidProfile>>,
    configs: Mutex<HashMap<String, GameConfig>>,
    states: Mutex<HashMap<String, ChannelState>>,
    last_fact: Mutex<HashMap<String, usize>>,
    profile_store: Arc<dyn ProfileStore>,
    game_store: Arc<dyn GameStore>,
    log: Arc<dyn OutcomeLog>,
    roll: RollFn,
}

/// The pyramid component: the passive observer plus its moderator
/// commands, all under the `pyramid` namespace.
pub struct PyramidComponent {
    core: Arc<PyramidCore>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl PyramidComponent {
    pub async fn new(
        profile_store: Arc<dyn ProfileStore>,
        game_store: Arc<dyn GameStore>,
        log: Arc<dyn OutcomeLog>,
    ) -> Self {
        Self::with_roll(
            profile_store,
            game_store,
            log,
            Arc::new(|| rand::random::<f64>()),
        )
        .await
    }

    /// Like [`new`](Self::new), with an injected roll source.
    pub async fn with_roll(
        profile_store: Arc<dyn ProfileStore>,
        game_store: Arc<dyn GameStore>,
        log: Arc<dyn OutcomeLog>,
        roll: RollFn,
    ) -> Self {
        let profiles = fetch_profiles(profile_store.as_ref()).await;
        let core = Arc::new(PyramidCore {
            profiles: RwLock::new(profiles),
            configs: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            last_fact: Mutex::new(HashMap::new()),
            profile_store,
            game_store,
            log,
            roll,
        });

        let handlers = build_handlers(&core);
        Self { core, handlers }
    }
}

impl Component for PyramidComponent {
    fn name(&self) -> &str {
        "pyramid"
    }

    fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.handlers.clone()
    }
}

/// The explicit registration table.
fn build_handlers(core: &Arc<PyramidCore>) -> Vec<Arc<dyn Handler>> {
    let observer = {
        let core = core.clone();
        PassiveHandler::new("pyramid", "observe", move |ctx| {
            let core = core.clone();
            async move { core.observe(ctx).await }
        })
    };

    let enable = {
        let core = core.clone();
        CommandHandler::builder("pyramid", "enable")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .restrict(Privilege::Moderator)
            .handler(move |ctx, _args| {
                let core = core.clone();
                async move { core.set_active(&ctx, true).await }
            })
    };

    let disable = {
        let core = core.clone();
        CommandHandler::builder("pyramid", "disable")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .restrict(Privilege::Moderator)
            .handler(move |ctx, _args| {
                let core = core.clone();
                async move { core.set_active(&ctx, false).await }
            })
    };

    let setprofile = {
        let core = core.clone();
        CommandHandler::builder("pyramid", "setprofile")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .restrict(Privilege::Moderator)
            .signature(Signature::new().required("profile", ArgType::Str))
            .handler(move |ctx, args| {
                let core = core.clone();
                async move {
                    let profile = args.str("profile")?.to_string();
                    core.set_profile(&ctx, profile).await
                }
            })
    };

    let refreshprofiles = {
        let core = core.clone();
        CommandHandler::builder("pyramid", "refreshprofiles")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .restrict(Privilege::Admin)
            .handler(move |ctx, _args| {
                let core = core.clone();
                async move { core.refresh_profiles(&ctx).await }
            })
    };

    let stats = {
        let core = core.clone();
        CommandHandler::builder("pyramid", "stats")
            .cooldown(std::time::Duration::from_secs(15))
            .handler(move |ctx, _args| {
                let core = core.clone();
                async move { core.stats(&ctx).await }
            })
    };

    // Profiles are editable at runtime; pick changes up once an hour even
    // if nobody asks for a refresh.
    let autorefresh = {
        let core = core.clone();
        ScheduledHandler::new(
            "pyramid",
            "autorefresh",
            "0 7 * * * *",
            "UTC",
            move |_ctx| {
                let core = core.clone();
                async move {
                    let profiles = fetch_profiles(core.profile_store.as_ref()).await;
                    if !profiles.is_empty() {
                        *core.profiles.write() = profiles;
                    }
                    Ok(Outcome::ok())
                }
            },
        )
        .expect("static schedule is valid")
    };

    vec![
        observer,
        enable,
        disable,
        setprofile,
        refreshprofiles,
        stats,
        autorefresh,
    ]
}

impl PyramidCore {
    // -------------------------------------------------------------------------
    // Detection
    // -------------------------------------------------------------------------

    async fn observe(&self, ctx: Arc<Context>) -> TriggerResult {
        let channel = ctx.channel().to_string();
        let config = match self.config_for(&channel).await {
            Ok(config) => config,
            Err(e) => {
                warn!(channel, error = %e, "pyramid config unavailable, skipping line");
                return Ok(Outcome::silent());
            }
        };
        if !config.active {
            return Ok(Outcome::silent());
        }

        let (outcome, record) = self.step(&ctx, &config);
        if let Some(record) = record {
            if let Err(e) = self.log.append(record).await {
                warn!(channel = %ctx.channel(), error = %e, "failed to append pyramid outcome");
            }
        }
        Ok(outcome)
    }

    /// One transition of the per-channel state machine. Returns the chat
    /// outcome and, for scored events, the record to append.
    fn step(&self, ctx: &Context, config: &GameConfig) -> (Outcome, Option<GameRecord>) {
        let channel = ctx.channel();
        let user = ctx.author().name.clone();
        let message = ctx.text().to_string();

        let mut states = self.states.lock();
        let state = states.entry(channel.to_string()).or_default();

        // Speaker switch: the previous attempt dies, scored if it was
        // tall enough.
        if user != state.last_user {
            let record = (state.max_level >= REQUIRED_PEAK).then(|| {
                info!(
                    channel,
                    loser = %state.last_user,
                    destroyer = %user,
                    token = %state.token,
                    peak = state.max_level,
                    "pyramid destroyed"
                );
                GameRecord {
                    channel: channel.to_string(),
                    user: state.last_user.clone(),
                    success: false,
                    peak: state.max_level,
                    token: state.token.clone(),
                    destroyer: Some(user.clone()),
                }
            });
            state.reset(&user, &message);
            return (Outcome::silent(), record);
        }

        // Nothing tracked yet: look for a word going 1 -> 2 across the
        // speaker's two lines.
        if state.level == 0 {
            let last_message = state.last_message.clone();
            let current = word_counts(&message);
            let previous = word_counts(&last_message);
            for (word, count) in &current {
                if *count == 2 && previous.get(word) == Some(&1) {
                    state.level = 2;
                    state.max_level = 2;
                    state.token = word.to_string();
                    info!(
                        channel,
                        token = %state.token,
                        speaker = %user,
                        level = state.level,
                        "pyramid detected"
                    );
                    return (Outcome::silent(), None);
                }
            }
            state.reset(&user, &message);
            return (Outcome::silent(), None);
        }

        let occurrences = (message.split(state.token.as_str()).count() - 1) as i64;
        let delta = occurrences - state.level as i64;

        // Rising by one from the peak.
        if delta == 1 && state.level == state.max_level {
            state.level = occurrences as u32;
            state.max_level = state.level;
            info!(
                channel,
                token = %state.token,
                level = state.level,
                peak = state.max_level,
                "pyramid rising"
            );
            if self.roll_against(channel, config, state.level, true) {
                let fact = self.pick_fact(channel, config);
                return (Outcome::say(format!("/me \u{25b2} FACT: {fact}")), None);
            }
            return (Outcome::silent(), None);
        }

        // Falling by one, and the attempt reached scoring height.
        if delta == -1 && state.max_level >= REQUIRED_PEAK {
            state.level = occurrences as u32;
            info!(
                channel,
                token = %state.token,
                level = state.level,
                peak = state.max_level,
                "pyramid falling"
            );
            if state.level == 1 {
                let record = GameRecord {
                    channel: channel.to_string(),
                    user: user.clone(),
                    success: true,
                    peak: state.max_level,
                    token: state.token.clone(),
                    destroyer: None,
                };
                info!(
                    channel,
                    builder = %user,
                    token = %state.token,
                    peak = state.max_level,
                    "pyramid completed"
                );
                let congrats = format!(
                    "/me \u{25b2} GRATS @{user}: {} high {} Clap",
                    state.max_level, state.token
                );
                state.reset(&user, &message);
                return (Outcome::say(congrats), Some(record));
            }
            if self.roll_against(channel, config, state.level, false) {
                let fact = self.pick_fact(channel, config);
                return (Outcome::say(format!("/me \u{25b2} FACT: {fact}")), None);
            }
            return (Outcome::silent(), None);
        }

        state.reset(&user, &message);
        (Outcome::silent(), None)
    }

    /// Draws against the profile's linear threshold for the current
    /// level. A draw above the threshold triggers an interruption.
    fn roll_against(&self, channel: &str, config: &GameConfig, level: u32, up: bool) -> bool {
        let profiles = self.profiles.read();
        let Some(profile) = profiles.get(&config.profile) else {
            warn!(channel, profile = %config.profile, "configured profile is unknown");
            return false;
        };
        let (base, slope) = if up {
            (profile.up_base, profile.up_slope)
        } else {
            (profile.down_base, profile.down_slope)
        };
        let threshold = base + f64::from(level - 1) * slope;
        let draw = (self.roll)();
        info!(channel, draw, threshold, level, up, "pyramid roll");
        draw > threshold
    }

    /// A random fact, never the one served last in this channel.
    fn pick_fact(&self, channel: &str, config: &GameConfig) -> String {
        if config.facts.is_empty() {
            return "pyramids are best admired from a distance".to_string();
        }
        let mut last_fact = self.last_fact.lock();
        let previous = last_fact.get(channel).copied();
        let len = config.facts.len();
        let draw_index = || (((self.roll)() * len as f64).floor() as usize).min(len - 1);
        let mut pick = draw_index();
        if len > 1 {
            while Some(pick) == previous {
                pick = draw_index();
            }
        }
        last_fact.insert(channel.to_string(), pick);
        config.facts[pick].clone()
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    async fn config_for(&self, channel: &str) -> Result<GameConfig, StoreError> {
        if let Some(config) = self.configs.lock().get(channel) {
            return Ok(config.clone());
        }
        let config = self.game_store.load(channel).await?;
        self.configs
            .lock()
            .insert(channel.to_string(), config.clone());
        Ok(config)
    }

    async fn store_config(
        &self,
        channel: &str,
        config: GameConfig,
    ) -> Result<(), TriggerError> {
        self.game_store
            .save(channel, &config)
            .await
            .map_err(store_failure)?;
        self.configs.lock().insert(channel.to_string(), config);
        Ok(())
    }

    async fn set_active(&self, ctx: &Context, active: bool) -> TriggerResult {
        let channel = ctx.channel().to_string();
        let mut config = self.config_for(&channel).await.map_err(store_failure)?;
        config.active = active;
        self.store_config(&channel, config).await?;
        info!(channel, active, by = %ctx.author().name, "pyramid watch toggled");
        Ok(Outcome::say(if active {
            "Pyramid watch enabled"
        } else {
            "No longer watching for pyramids"
        }))
    }

    async fn set_profile(&self, ctx: &Context, profile: String) -> TriggerResult {
        if !self.profiles.read().contains_key(&profile) {
            let mut known: Vec<String> =
                self.profiles.read().keys().cloned().collect();
            known.sort();
            return Err(DomainError::new(format!(
                "unknown profile '{profile}'; available: {}",
                known.join(", ")
            ))
            .into());
        }

        let channel = ctx.channel().to_string();
        let mut config = self.config_for(&channel).await.map_err(store_failure)?;
        config.profile = profile.clone();
        self.store_config(&channel, config).await?;
        info!(channel, profile, by = %ctx.author().name, "dooming profile changed");
        Ok(Outcome::say(format!("dooming profile changed to '{profile}'")))
    }

    async fn refresh_profiles(&self, ctx: &Context) -> TriggerResult {
        let profiles = fetch_profiles(self.profile_store.as_ref()).await;
        if profiles.is_empty() {
            return Err(DomainError::new("no profiles available from storage").into());
        }
        let mut names: Vec<String> = profiles.keys().cloned().collect();
        names.sort();
        *self.profiles.write() = profiles;
        info!(channel = %ctx.channel(), by = %ctx.author().name, "profiles refreshed");
        Ok(Outcome::say(format!(
            "Profiles refreshed; available: {}",
            names.join(", ")
        )))
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    async fn stats(&self, ctx: &Context) -> TriggerResult {
        let channel = ctx.channel().to_string();
        let records = self
            .log
            .recent(&channel, 24)
            .await
            .map_err(store_failure)?;
        if records.is_empty() {
            return Ok(Outcome::say(format!("no pyramids on record in #{channel}")));
        }

        let built = records.iter().filter(|r| r.success).count();
        let destroyed = records.len() - built;
        let peaks: Vec<f64> = records.iter().map(|r| f64::from(r.peak)).collect();
        let graph = sparkline(&peaks, 12, |v| format!("{v:.0}"));
        Ok(Outcome::say(format!(
            "pyramids: {built} built, {destroyed} destroyed | peaks: {graph}"
        )))
    }
}

fn store_failure(e: StoreError) -> TriggerError {
    DomainError::new(format!("pyramid settings unavailable: {e}")).into()
}

/// Per-word occurrence counts of one line.
fn word_counts(message: &str) -> HashMap<&str, u32> {
    let mut counts = HashMap::new();
    for word in message.split_whitespace() {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

/// Loads profiles from storage, dropping any with a non-finite curve.
async fn fetch_profiles(store: &dyn ProfileStore) -> HashMap<String, PyramidProfile> {
    match store.profiles().await {
        Ok(profiles) => profiles
            .into_iter()
            .filter(|(name, p)| {
                let finite = [p.up_base, p.up_slope, p.down_base, p.down_slope]
                    .iter()
                    .all(|v| v.is_finite());
                if !finite {
                    warn!(profile = %name, "dropping profile with non-finite curve");
                }
                finite
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "profile store unavailable");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;

    use ziggurat_core::{
        ChatLine, Chatter, Connector, Context, RoleFlags, SendResult,
    };

    use crate::store::MemoryStore;

    struct SilentConnector;

    #[async_trait]
    impl Connector for SilentConnector {
        fn bot_name(&self) -> &str {
            "zigbot"
        }

        async fn send(&self, _channel: &str, _text: &str) -> SendResult<()> {
            Ok(())
        }

        async fn ping(&self, _tag: &str) -> SendResult<()> {
            Ok(())
        }

        async fn join(&self, _channel: &str) -> SendResult<()> {
            Ok(())
        }

        async fn part(&self, _channel: &str) -> SendResult<()> {
            Ok(())
        }
    }

    /// A roll source that replays a scripted sequence, then yields 0.0
    /// (which never beats a positive threshold).
    fn scripted_rolls(script: Vec<f64>) -> RollFn {
        let script = PlMutex::new(VecDeque::from(script));
        Arc::new(move || script.lock().pop_front().unwrap_or(0.0))
    }

    fn ctx(channel: &str, user: &str, text: &str) -> Arc<Context> {
        let line = ChatLine::new(channel, Chatter::new(user, RoleFlags::none()), text);
        Arc::new(Context::new(
            line,
            Arc::new(SilentConnector),
            Arc::from(Vec::<String>::new()),
            false,
        ))
    }

    async fn active_component(store: Arc<MemoryStore>, rolls: Vec<f64>) -> PyramidComponent {
        let mut config = default_config();
        config.active = true;
        store.save("c", &config).await.unwrap();
        PyramidComponent::with_roll(
            store.clone(),
            store.clone(),
            store,
            scripted_rolls(rolls),
        )
        .await
    }

    async fn observe(component: &PyramidComponent, channel: &str, user: &str, text: &str) -> Outcome {
        component
            .core
            .observe(ctx(channel, user, text))
            .await
            .expect("observer never fails")
    }

    #[tokio::test]
    async fn full_pyramid_scores_a_win() {
        let store = MemoryStore::new(default_config(), default_profiles());
        // Rolls stay at 0.0: never above a kind threshold, no interruptions.
        let component = active_component(store.clone(), vec![]).await;

        assert_eq!(observe(&component, "c", "a", "go").await, Outcome::silent());
        assert_eq!(observe(&component, "c", "a", "go go").await, Outcome::silent());
        assert_eq!(observe(&component, "c", "a", "go go go").await, Outcome::silent());
        assert_eq!(observe(&component, "c", "a", "go go").await, Outcome::silent());

        let finale = observe(&component, "c", "a", "go").await;
        assert_eq!(
            finale,
            Outcome::say("/me \u{25b2} GRATS @a: 3 high go Clap")
        );

        let records = store.recent("c", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.success);
        assert_eq!(record.peak, 3);
        assert_eq!(record.token, "go");
        assert_eq!(record.user, "a");
        assert_eq!(record.destroyer, None);
    }

    #[tokio::test]
    async fn speaker_switch_scores_a_loss_with_destroyer() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let component = active_component(store.clone(), vec![]).await;

        observe(&component, "c", "a", "go").await;
        observe(&component, "c", "a", "go go").await;
        observe(&component, "c", "a", "go go go").await;
        // Someone else barges in mid-build.
        observe(&component, "c", "b", "hi chat").await;

        let records = store.recent("c", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(!record.success);
        assert_eq!(record.peak, 3);
        assert_eq!(record.user, "a");
        assert_eq!(record.destroyer.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn short_patterns_never_score() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let component = active_component(store.clone(), vec![]).await;

        observe(&component, "c", "a", "go").await;
        observe(&component, "c", "a", "go go").await;
        // Broken at level 2, below the scoring height.
        observe(&component, "c", "b", "nope").await;

        assert!(store.recent("c", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interruption_fires_when_the_roll_beats_the_threshold() {
        let store = MemoryStore::new(default_config(), default_profiles());
        // kind up-curve at level 3: 0.97 + 2 * 0.01 = 0.99. First roll is
        // the interruption draw, second picks the fact.
        let component = active_component(store.clone(), vec![0.995, 0.4]).await;

        observe(&component, "c", "a", "go").await;
        // Level 2 detection does not roll.
        observe(&component, "c", "a", "go go").await;
        let out = observe(&component, "c", "a", "go go go").await;
        match out.body() {
            ziggurat_core::Body::Text(text) => {
                assert!(text.starts_with("/me \u{25b2} FACT: "), "got: {text}");
            }
            other => panic!("expected a fact, got {other:?}"),
        }
        // Interruption does not reset the state by itself; the echoed
        // fact line arrives as a different speaker and scores the loss.
        observe(&component, "c", "zigbot", "/me \u{25b2} FACT: whatever").await;
        let records = store.recent("c", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].destroyer.as_deref(), Some("zigbot"));
    }

    #[tokio::test]
    async fn facts_never_repeat_back_to_back() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let config = {
            let mut c = default_config();
            c.facts = vec!["one".into(), "two".into(), "three".into()];
            c
        };
        // Scripted picks: index 1, then 1 again (rejected) falling back
        // to 0.0 -> index 0.
        let core = PyramidCore {
            profiles: RwLock::new(default_profiles()),
            configs: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            last_fact: Mutex::new(HashMap::new()),
            profile_store: store.clone(),
            game_store: store.clone(),
            log: store,
            roll: scripted_rolls(vec![0.5, 0.5]),
        };
        let first = core.pick_fact("c", &config);
        assert_eq!(first, "two");
        let second = core.pick_fact("c", &config);
        assert_eq!(second, "one");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let component = active_component(store.clone(), vec![]).await;
        let mut config = default_config();
        config.active = true;
        store.save("d", &config).await.unwrap();

        observe(&component, "c", "a", "go").await;
        observe(&component, "c", "a", "go go").await;
        // A parallel conversation in another channel does not disturb c.
        observe(&component, "d", "a", "unrelated").await;
        observe(&component, "c", "a", "go go go").await;
        observe(&component, "c", "a", "go go").await;
        let finale = observe(&component, "c", "a", "go").await;
        assert_eq!(
            finale,
            Outcome::say("/me \u{25b2} GRATS @a: 3 high go Clap")
        );
    }

    #[tokio::test]
    async fn inactive_channels_are_ignored() {
        let store = MemoryStore::new(default_config(), default_profiles());
        // Never activated: the default template is off.
        let component = PyramidComponent::with_roll(
            store.clone(),
            store.clone(),
            store.clone(),
            scripted_rolls(vec![]),
        )
        .await;

        observe(&component, "c", "a", "go").await;
        observe(&component, "c", "a", "go go").await;
        observe(&component, "c", "a", "go go go").await;
        observe(&component, "c", "b", "broken").await;
        assert!(store.recent("c", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn irregular_step_resets_the_pattern() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let component = active_component(store.clone(), vec![]).await;

        observe(&component, "c", "a", "go").await;
        observe(&component, "c", "a", "go go").await;
        // Jumping two levels is not a pyramid.
        observe(&component, "c", "a", "go go go go").await;
        // The reset cached the four-go line; a regular climb can restart.
        observe(&component, "c", "b", "reset me").await;
        assert!(store.recent("c", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commands_gate_and_mutate_configuration() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let component = PyramidComponent::with_roll(
            store.clone(),
            store.clone(),
            store.clone(),
            scripted_rolls(vec![]),
        )
        .await;

        let out = component.core.set_active(&ctx("c", "mod", "x"), true).await.unwrap();
        assert_eq!(out, Outcome::say("Pyramid watch enabled"));
        assert!(store.load("c").await.unwrap().active);

        let out = component
            .core
            .set_profile(&ctx("c", "mod", "x"), "cruel".to_string())
            .await
            .unwrap();
        assert_eq!(out, Outcome::say("dooming profile changed to 'cruel'"));
        assert_eq!(store.load("c").await.unwrap().profile, "cruel");

        let err = component
            .core
            .set_profile(&ctx("c", "mod", "x"), "nonsense".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::Domain(_)));
    }

    #[tokio::test]
    async fn stats_reports_counts_and_sparkline() {
        let store = MemoryStore::new(default_config(), default_profiles());
        let component = active_component(store.clone(), vec![]).await;

        let out = component.core.stats(&ctx("c", "a", "x")).await.unwrap();
        assert_eq!(out, Outcome::say("no pyramids on record in #c"));

        for (peak, success) in [(3, true), (4, false), (5, true)] {
            store
                .append(GameRecord {
                    channel: "c".to_string(),
                    user: "a".to_string(),
                    success,
                    peak,
                    token: "go".to_string(),
                    destroyer: (!success).then(|| "b".to_string()),
                })
                .await
                .unwrap();
        }

        let out = component.core.stats(&ctx("c", "a", "x")).await.unwrap();
        match out.body() {
            ziggurat_core::Body::Text(text) => {
                assert!(text.contains("2 built"), "got: {text}");
                assert!(text.contains("1 destroyed"), "got: {text}");
                assert!(text.contains('['), "got: {text}");
            }
            other => panic!("expected text, got {other:?}"),
        }
    }
}
