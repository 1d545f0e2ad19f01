//! Housekeeping commands: liveness reporting and channel membership.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::info;

use ziggurat_core::PongRouter;
use ziggurat_framework::prelude::*;

use crate::util::units::{humanize_bytes, humanize_duration};

/// The ping probe bounds its own round trip; nothing else does.
const PONG_TIMEOUT: Duration = Duration::from_secs(5);

struct MetaCore {
    started: Instant,
    pongs: Arc<PongRouter>,
    home_channel: String,
    tag_counter: AtomicU64,
    system: Mutex<System>,
}

/// The `meta` component: ping/fullping, join and part.
pub struct MetaComponent {
    handlers: Vec<Arc<dyn Handler>>,
}

impl MetaComponent {
    pub fn new(started: Instant, pongs: Arc<PongRouter>, home_channel: String) -> Self {
        let core = Arc::new(MetaCore {
            started,
            pongs,
            home_channel,
            tag_counter: AtomicU64::new(0),
            system: Mutex::new(System::new()),
        });
        Self {
            handlers: build_handlers(&core),
        }
    }
}

impl Component for MetaComponent {
    fn name(&self) -> &str {
        "meta"
    }

    fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.handlers.clone()
    }
}

fn build_handlers(core: &Arc<MetaCore>) -> Vec<Arc<dyn Handler>> {
    let ping = {
        let core = core.clone();
        CommandHandler::builder("meta", "ping")
            .cooldown_with(
                Duration::from_secs(10),
                Privilege::Nobody,
                Scope::Channel,
            )
            .handler(move |ctx, _args| {
                let core = core.clone();
                async move { core.ping_report(&ctx).await }
            })
    };

    let fullping = {
        let core = core.clone();
        CommandHandler::builder("meta", "fullping")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .cooldown_with(
                Duration::from_secs(10),
                Privilege::Nobody,
                Scope::Channel,
            )
            .handler(move |ctx, _args| {
                let core = core.clone();
                async move { core.ping_report(&ctx).await }
            })
    };

    let join = {
        let core = core.clone();
        CommandHandler::builder("meta", "join")
            .channels([core.home_channel.clone()])
            .signature(Signature::new().required("channel", ArgType::Str))
            .handler(move |ctx, args| {
                let core = core.clone();
                async move {
                    let target = args.str("channel")?.to_lowercase();
                    core.join(&ctx, target).await
                }
            })
    };

    let part = {
        let core = core.clone();
        CommandHandler::builder("meta", "part")
            .restrict(Privilege::Broadcaster)
            .signature(Signature::new().optional("channel", ArgType::Str, None))
            .handler(move |ctx, args| {
                let core = core.clone();
                async move {
                    let target = args.opt_str("channel")?.map(str::to_lowercase);
                    core.part(&ctx, target).await
                }
            })
    };

    vec![ping, fullping, join, part]
}

impl MetaCore {
    /// Round-trip latency, uptime and process memory in one line.
    async fn ping_report(&self, ctx: &Context) -> TriggerResult {
        let tag = format!(
            "zig-{}",
            self.tag_counter.fetch_add(1, Ordering::Relaxed)
        );
        let waiter = self.pongs.register(&tag);
        let sent_at = Instant::now();

        let latency = match ctx.connector().ping(&tag).await {
            Err(e) => {
                self.pongs.forget(&tag);
                return Err(DomainError::new(format!("ping failed: {e}")).into());
            }
            Ok(()) => match tokio::time::timeout(PONG_TIMEOUT, waiter).await {
                Ok(Ok(())) => humanize_duration(sent_at.elapsed() / 2),
                _ => {
                    self.pongs.forget(&tag);
                    "timeout".to_string()
                }
            },
        };

        let uptime = humanize_duration(self.started.elapsed());
        let alloc = self.process_memory();

        Ok(Outcome::say(format!(
            "latency: {latency} | uptime: {uptime} | alloc: {alloc}"
        )))
    }

    fn process_memory(&self) -> String {
        let pid = Pid::from_u32(std::process::id());
        let mut system = self.system.lock();
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|process| humanize_bytes(process.memory()))
            .unwrap_or_else(|| "?".to_string())
    }

    /// Join a channel. Allowed for operators, or for a chatter asking the
    /// bot into their own channel.
    async fn join(&self, ctx: &Context, target: String) -> TriggerResult {
        if ctx.privilege() < Privilege::Admin && ctx.author().name != target {
            return Ok(Outcome::silent());
        }
        ctx.connector()
            .join(&target)
            .await
            .map_err(|e| DomainError::new(format!("could not join #{target}: {e}")))?;
        info!(channel = %target, by = %ctx.author().name, "joining channel");
        Ok(Outcome::say(format!("joining channel #{target}")))
    }

    /// Part a channel, defaulting to the caller's own. The home channel
    /// stays.
    async fn part(&self, ctx: &Context, target: Option<String>) -> TriggerResult {
        if ctx.channel() != ctx.author().name && ctx.channel() != self.home_channel {
            return Err(DomainError::new(
                "ask in your own channel or the bot's home channel",
            )
            .into());
        }
        let target = target.unwrap_or_else(|| ctx.author().name.clone());
        if target == self.home_channel {
            return Err(DomainError::new("the home channel cannot be parted").into());
        }
        ctx.connector()
            .part(&target)
            .await
            .map_err(|e| DomainError::new(format!("could not part #{target}: {e}")))?;
        info!(channel = %target, by = %ctx.author().name, "parting channel");
        Ok(Outcome::say(format!("parting channel #{target}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;

    use ziggurat_core::{
        ChatLine, Chatter, Connector, Context, RoleFlags, SendResult,
    };

    struct LoopbackConnector {
        pongs: Arc<PongRouter>,
        parted: PlMutex<Vec<String>>,
        joined: PlMutex<Vec<String>>,
    }

    #[async_trait]
    impl Connector for LoopbackConnector {
        fn bot_name(&self) -> &str {
            "zigbot"
        }

        async fn send(&self, _channel: &str, _text: &str) -> SendResult<()> {
            Ok(())
        }

        async fn ping(&self, tag: &str) -> SendResult<()> {
            // Answer instantly, as a local echo would.
            self.pongs.resolve(tag);
            Ok(())
        }

        async fn join(&self, channel: &str) -> SendResult<()> {
            self.joined.lock().push(channel.to_string());
            Ok(())
        }

        async fn part(&self, channel: &str) -> SendResult<()> {
            self.parted.lock().push(channel.to_string());
            Ok(())
        }
    }

    fn harness() -> (Arc<LoopbackConnector>, Arc<MetaCore>) {
        let pongs = Arc::new(PongRouter::new());
        let connector = Arc::new(LoopbackConnector {
            pongs: pongs.clone(),
            parted: PlMutex::new(Vec::new()),
            joined: PlMutex::new(Vec::new()),
        });
        let core = Arc::new(MetaCore {
            started: Instant::now(),
            pongs,
            home_channel: "zigbot".to_string(),
            tag_counter: AtomicU64::new(0),
            system: Mutex::new(System::new()),
        });
        (connector, core)
    }

    fn ctx(
        connector: &Arc<LoopbackConnector>,
        channel: &str,
        author: &str,
        roles: RoleFlags,
        operators: &[&str],
    ) -> Context {
        let line = ChatLine::new(channel, Chatter::new(author, roles), "");
        let operators: Vec<String> = operators.iter().map(|s| s.to_string()).collect();
        Context::new(line, connector.clone(), Arc::from(operators), false)
    }

    #[tokio::test]
    async fn ping_reports_latency_uptime_and_memory() {
        let (connector, core) = harness();
        let ctx = ctx(&connector, "lobby", "alice", RoleFlags::none(), &[]);
        let out = core.ping_report(&ctx).await.unwrap();
        match out.body() {
            ziggurat_core::Body::Text(text) => {
                assert!(text.contains("latency: "), "got: {text}");
                assert!(text.contains("uptime: "), "got: {text}");
                assert!(text.contains("alloc: "), "got: {text}");
                assert!(!text.contains("timeout"), "got: {text}");
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_requires_own_channel_or_operator() {
        let (connector, core) = harness();

        // A chatter may call the bot into their own channel.
        let own = ctx(&connector, "zigbot", "alice", RoleFlags::none(), &[]);
        let out = core.join(&own, "alice".to_string()).await.unwrap();
        assert_eq!(out, Outcome::say("joining channel #alice"));

        // But not into someone else's.
        let foreign = ctx(&connector, "zigbot", "alice", RoleFlags::none(), &[]);
        let out = core.join(&foreign, "bob".to_string()).await.unwrap();
        assert_eq!(out.code(), OutcomeCode::Silent);

        // Operators may.
        let operator = ctx(&connector, "zigbot", "root", RoleFlags::none(), &["root"]);
        let out = core.join(&operator, "bob".to_string()).await.unwrap();
        assert_eq!(out, Outcome::say("joining channel #bob"));

        assert_eq!(*connector.joined.lock(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn part_protects_the_home_channel() {
        let (connector, core) = harness();
        let broadcaster = RoleFlags {
            broadcaster: true,
            ..RoleFlags::none()
        };

        // Defaulting to the caller's own channel works from there.
        let own = ctx(&connector, "alice", "alice", broadcaster, &[]);
        let out = core.part(&own, None).await.unwrap();
        assert_eq!(out, Outcome::say("parting channel #alice"));

        // The home channel refuses.
        let home = ctx(&connector, "zigbot", "alice", broadcaster, &[]);
        let err = core.part(&home, Some("zigbot".to_string())).await.unwrap_err();
        assert!(matches!(err, TriggerError::Domain(_)));

        // Asking from an unrelated channel refuses.
        let elsewhere = ctx(&connector, "bob", "alice", broadcaster, &[]);
        let err = core.part(&elsewhere, None).await.unwrap_err();
        assert!(matches!(err, TriggerError::Domain(_)));

        assert_eq!(*connector.parted.lock(), vec!["alice"]);
    }
}
