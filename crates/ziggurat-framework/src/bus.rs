//! The dispatch bus.
//!
//! The bus owns the alias table and the passive handler list, turns every
//! inbound line into a set of independent handler invocations, and
//! consumes each resulting [`Outcome`] exactly once on the delivery side.
//!
//! # Dispatch
//!
//! For one inbound line, all triggered handlers are started together as
//! separate tasks; their outcomes are delivered in *completion* order.
//! Cross-handler output ordering is deliberately unspecified - only the
//! ordering within one handler's own outcome is preserved.
//!
//! # Delivery
//!
//! - `Ok` sends its text (or each line of its sequence, in order)
//! - `Silent` never produces outbound text
//! - `Error` is reported back to the caller and logged at warn
//! - `Uncaught` / `Malformed` are logged at error; the detail is echoed
//!   to chat only in the dev environment, never in production

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, error, info, warn};

use ziggurat_core::{Body, ChatLine, Context, Outcome, OutcomeCode};
use ziggurat_core::connector::BoxedConnector;

use crate::component::Component;
use crate::handler::Handler;

/// Settings the bus is built with.
#[derive(Debug, Clone)]
pub struct BusOptions {
    /// The fixed command prefix.
    pub prefix: String,
    /// The bot's home channel; synthetic contexts are authored here.
    /// Empty means "the bot's own channel".
    pub home_channel: String,
    /// Identities pinned to Admin privilege.
    pub operators: Vec<String>,
    /// Dev environment: outbound lines are marked and fault details may be
    /// echoed.
    pub dev: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            prefix: "+".to_string(),
            home_channel: String::new(),
            operators: Vec::new(),
            dev: false,
        }
    }
}

struct BusInner {
    connector: BoxedConnector,
    keyword: Regex,
    home_channel: String,
    operators: Arc<[String]>,
    dev: bool,
    commands: RwLock<HashMap<String, Arc<dyn Handler>>>,
    passives: RwLock<Vec<Arc<dyn Handler>>>,
    mounted: RwLock<HashMap<String, Vec<Arc<dyn Handler>>>>,
}

/// The dispatch bus. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    pub fn new(connector: BoxedConnector, options: BusOptions) -> Self {
        let keyword = Regex::new(&format!(
            "^{}([A-Za-z0-9_.]+)",
            regex::escape(&options.prefix)
        ))
        .expect("escaped prefix always forms a valid pattern");
        let home_channel = if options.home_channel.is_empty() {
            connector.bot_name().to_string()
        } else {
            options.home_channel
        };
        Self {
            inner: Arc::new(BusInner {
                connector,
                keyword,
                home_channel,
                operators: Arc::from(options.operators),
                dev: options.dev,
                commands: RwLock::new(HashMap::new()),
                passives: RwLock::new(Vec::new()),
                mounted: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn connector(&self) -> &BoxedConnector {
        &self.inner.connector
    }

    pub fn home_channel(&self) -> &str {
        &self.inner.home_channel
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Mounts a component: registers every handler in its table.
    pub fn mount(&self, component: &dyn Component) {
        let handlers = component.handlers();
        for handler in &handlers {
            let description = handler.clone().register(self);
            info!(
                handler = %handler.qualified_name(),
                %description,
                "handler registered"
            );
        }
        self.inner
            .mounted
            .write()
            .insert(component.name().to_string(), handlers);
        info!(component = component.name(), "component mounted");
    }

    /// Unmounts a component, unregistering all of its handlers.
    pub fn unmount(&self, name: &str) {
        let Some(handlers) = self.inner.mounted.write().remove(name) else {
            warn!(component = name, "unmount of unknown component");
            return;
        };
        for handler in handlers {
            handler.clone().unregister(self);
        }
        info!(component = name, "component unmounted");
    }

    /// Binds a command handler under each of its aliases.
    pub fn add_command(&self, handler: Arc<dyn Handler>, aliases: &[String]) {
        let mut commands = self.inner.commands.write();
        for alias in aliases {
            if let Some(previous) = commands.insert(alias.clone(), handler.clone()) {
                if previous.qualified_name() != handler.qualified_name() {
                    warn!(
                        alias,
                        newcomer = %handler.qualified_name(),
                        displaced = %previous.qualified_name(),
                        "alias overrode an existing command"
                    );
                }
            }
        }
    }

    /// Removes a command's aliases, leaving slots taken over by other
    /// handlers untouched.
    pub fn remove_command(&self, aliases: &[String], qualified: &str) {
        let mut commands = self.inner.commands.write();
        for alias in aliases {
            if commands
                .get(alias)
                .is_some_and(|h| h.qualified_name() == qualified)
            {
                commands.remove(alias);
            }
        }
    }

    pub fn add_passive(&self, handler: Arc<dyn Handler>) {
        self.inner.passives.write().push(handler);
    }

    pub fn remove_passive(&self, qualified: &str) {
        self.inner
            .passives
            .write()
            .retain(|h| h.qualified_name() != qualified);
    }

    /// A sorted snapshot of the alias table, mostly for inspection.
    pub fn command_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> =
            self.inner.commands.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    // -------------------------------------------------------------------------
    // Contexts
    // -------------------------------------------------------------------------

    /// A fresh per-invocation context for an inbound line. Each triggered
    /// handler gets its own, so redirects and mutes never leak across.
    pub fn context_for(&self, line: &ChatLine) -> Arc<Context> {
        Arc::new(Context::new(
            line.clone(),
            self.inner.connector.clone(),
            self.inner.operators.clone(),
            self.inner.dev,
        ))
    }

    /// The synthetic self-authored context scheduled ticks run under.
    pub fn synthetic_context(&self) -> Arc<Context> {
        let line = ChatLine::synthetic(
            self.inner.connector.bot_name(),
            self.inner.home_channel.clone(),
        );
        self.context_for(&line)
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Dispatches one inbound line: resolves the command keyword (if any)
    /// against the alias table, triggers every passive handler, and
    /// delivers outcomes as invocations complete.
    pub async fn dispatch(&self, line: ChatLine) {
        let mut running = FuturesUnordered::new();

        if let Some(captures) = self.inner.keyword.captures(&line.text) {
            let keyword = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let raw_start = captures.get(0).map(|m| m.end()).unwrap_or_default();
            let handler = self.inner.commands.read().get(keyword).cloned();
            match handler {
                Some(handler) => {
                    let raw = line.text[raw_start..].trim_start().to_string();
                    let ctx = self.context_for(&line);
                    debug!(
                        alias = keyword,
                        handler = %handler.qualified_name(),
                        channel = %line.channel,
                        "command triggered"
                    );
                    running.push(tokio::spawn(async move {
                        let outcome = handler.actuate(ctx.clone(), &raw).await;
                        (ctx, outcome)
                    }));
                }
                None => debug!(alias = keyword, "no command bound to keyword"),
            }
        }

        let passives: Vec<Arc<dyn Handler>> =
            self.inner.passives.read().iter().cloned().collect();
        for handler in passives {
            let ctx = self.context_for(&line);
            running.push(tokio::spawn(async move {
                let outcome = handler.actuate(ctx.clone(), "").await;
                (ctx, outcome)
            }));
        }

        while let Some(joined) = running.next().await {
            match joined {
                Ok((ctx, outcome)) => self.deliver(&ctx, outcome).await,
                Err(e) => error!(error = %e, "handler task died outside the actuation guard"),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    /// Consumes one outcome: sends whatever it carries and logs per the
    /// failure taxonomy.
    pub async fn deliver(&self, ctx: &Context, outcome: Outcome) {
        match outcome.code() {
            OutcomeCode::Ok => match outcome.body() {
                Body::Empty => {}
                Body::Text(text) => self.send_line(ctx, text).await,
                Body::Lines(lines) => {
                    for text in lines {
                        self.send_line(ctx, text).await;
                    }
                }
                Body::Fault(detail) => {
                    warn!(detail, "ok outcome carried fault detail, dropping");
                }
            },
            OutcomeCode::Silent => {
                debug!(channel = %ctx.channel(), "silent outcome");
            }
            OutcomeCode::Error => {
                let detail = outcome.fault().unwrap_or("unspecified failure");
                warn!(channel = %ctx.channel(), detail, "handler failure");
                self.send_line(ctx, detail).await;
            }
            OutcomeCode::Uncaught | OutcomeCode::Malformed => {
                let detail = outcome.fault().unwrap_or("no detail");
                error!(
                    channel = %ctx.channel(),
                    code = ?outcome.code(),
                    detail,
                    "programming fault in handler"
                );
                if self.inner.dev {
                    let first_line = detail.lines().next().unwrap_or(detail);
                    self.send_line(ctx, &format!("\u{26a0} {first_line}")).await;
                }
            }
        }
    }

    async fn send_line(&self, ctx: &Context, text: &str) {
        if let Err(e) = ctx.say(text).await {
            warn!(channel = %ctx.reply_channel(), error = %e, "outbound send failed");
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("commands", &self.inner.commands.read().len())
            .field("passives", &self.inner.passives.read().len())
            .field("home_channel", &self.inner.home_channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::args::{ArgType, Signature};
    use crate::handler::command::{AliasPolicy, CommandHandler};
    use crate::handler::passive::PassiveHandler;
    use crate::testing::RecordingConnector;
    use ziggurat_core::{Chatter, RoleFlags};

    fn line(channel: &str, author: &str, text: &str) -> ChatLine {
        ChatLine::new(channel, Chatter::new(author, RoleFlags::none()), text)
    }

    fn bus_on(connector: Arc<RecordingConnector>, dev: bool) -> Bus {
        Bus::new(
            connector,
            BusOptions {
                dev,
                ..BusOptions::default()
            },
        )
    }

    struct OneShot {
        handlers: Vec<Arc<dyn Handler>>,
    }

    impl Component for OneShot {
        fn name(&self) -> &str {
            "test"
        }

        fn handlers(&self) -> Vec<Arc<dyn Handler>> {
            self.handlers.clone()
        }
    }

    #[tokio::test]
    async fn prefixed_keyword_reaches_the_command() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), false);
        let echo = CommandHandler::builder("test", "echo")
            .signature(Signature::new().required("text", ArgType::Str))
            .handler(|_ctx, args| async move {
                Ok(Outcome::say(args.str("text")?.to_string()))
            });
        bus.mount(&OneShot {
            handlers: vec![echo],
        });

        bus.dispatch(line("lobby", "alice", "+echo hello")).await;
        assert_eq!(connector.sent_texts(), vec!["hello".to_string()]);

        // Unprefixed lines never reach the command.
        bus.dispatch(line("lobby", "alice", "echo hello")).await;
        assert_eq!(connector.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn register_unregister_restores_alias_table() {
        let bus = bus_on(RecordingConnector::new(), false);
        let before = bus.command_aliases();

        let cmd = CommandHandler::builder("test", "thing")
            .handler(|_ctx, _args| async move { Ok(Outcome::ok()) });
        bus.mount(&OneShot {
            handlers: vec![cmd],
        });
        assert_eq!(
            bus.command_aliases(),
            vec!["test.thing".to_string(), "thing".to_string()]
        );

        bus.unmount("test");
        assert_eq!(bus.command_aliases(), before);
    }

    #[tokio::test]
    async fn qualified_only_never_takes_the_bare_slot() {
        let bus = bus_on(RecordingConnector::new(), false);
        let cmd = CommandHandler::builder("test", "thing")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .handler(|_ctx, _args| async move { Ok(Outcome::ok()) });
        bus.mount(&OneShot {
            handlers: vec![cmd],
        });
        assert_eq!(bus.command_aliases(), vec!["test.thing".to_string()]);
    }

    #[tokio::test]
    async fn unregister_leaves_displaced_aliases_alone() {
        let bus = bus_on(RecordingConnector::new(), false);
        let first = CommandHandler::builder("one", "go")
            .alias_policy(AliasPolicy::LocalOnly)
            .handler(|_ctx, _args| async move { Ok(Outcome::ok()) });
        let second = CommandHandler::builder("two", "go")
            .alias_policy(AliasPolicy::LocalOnly)
            .handler(|_ctx, _args| async move { Ok(Outcome::ok()) });

        first.clone().register(&bus);
        // Second takes over the bare alias.
        second.clone().register(&bus);
        // Unregistering the displaced handler must not evict the newcomer.
        first.unregister(&bus);
        assert_eq!(bus.command_aliases(), vec!["go".to_string()]);
    }

    #[tokio::test]
    async fn passives_fire_on_every_line() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), false);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let passive = PassiveHandler::new("test", "watch", move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::silent())
            }
        });
        bus.mount(&OneShot {
            handlers: vec![passive],
        });

        bus.dispatch(line("lobby", "alice", "anything")).await;
        bus.dispatch(line("lobby", "bob", "+even commands")).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        // Silent outcomes never produce outbound text.
        assert!(connector.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn lines_are_delivered_in_order() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), false);
        let cmd = CommandHandler::builder("test", "multi")
            .handler(|_ctx, _args| async move {
                Ok(Outcome::lines(vec![
                    "first".to_string(),
                    "second".to_string(),
                    "third".to_string(),
                ]))
            });
        bus.mount(&OneShot {
            handlers: vec![cmd],
        });

        bus.dispatch(line("lobby", "alice", "+multi")).await;
        assert_eq!(
            connector.sent_texts(),
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
    }

    #[tokio::test]
    async fn uncaught_fault_is_never_echoed_in_production() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), false);
        let cmd = CommandHandler::builder("test", "explode")
            .handler(|_ctx, _args| async move { panic!("secret internals") });
        bus.mount(&OneShot {
            handlers: vec![cmd],
        });

        bus.dispatch(line("lobby", "alice", "+explode")).await;
        assert!(connector.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn uncaught_fault_is_summarized_in_dev() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), true);
        let cmd = CommandHandler::builder("test", "explode")
            .handler(|_ctx, _args| async move { panic!("boom\nwith detail") });
        bus.mount(&OneShot {
            handlers: vec![cmd],
        });

        bus.dispatch(line("lobby", "alice", "+explode")).await;
        let sent = connector.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("boom"));
        assert!(!sent[0].contains("with detail"));
    }

    #[tokio::test]
    async fn one_failing_handler_does_not_disturb_others() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), false);
        let bad = PassiveHandler::new("test", "bad", |_ctx| async move {
            panic!("broken observer")
        });
        let good = PassiveHandler::new("test", "good", |_ctx| async move {
            Ok(Outcome::say("still here"))
        });
        bus.mount(&OneShot {
            handlers: vec![bad, good],
        });

        bus.dispatch(line("lobby", "alice", "hello")).await;
        assert_eq!(connector.sent_texts(), vec!["still here".to_string()]);
    }

    #[tokio::test]
    async fn domain_errors_are_reported_to_the_caller() {
        let connector = RecordingConnector::new();
        let bus = bus_on(connector.clone(), false);
        let cmd = CommandHandler::builder("test", "fail").handler(|_ctx, _args| async move {
            Err(ziggurat_core::DomainError::new("that channel does not exist").into())
        });
        bus.mount(&OneShot {
            handlers: vec![cmd],
        });

        bus.dispatch(line("lobby", "alice", "+fail")).await;
        assert_eq!(
            connector.sent_texts(),
            vec!["that channel does not exist".to_string()]
        );
    }
}
