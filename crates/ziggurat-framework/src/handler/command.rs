//! Command handlers: reached by explicit prefixed invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tower::ServiceExt;

use ziggurat_core::{Context, Outcome, Privilege};

use crate::args::{bind, BoundArgs, Signature};
use crate::bus::Bus;
use crate::handler::{Handler, TriggerFuture};
use crate::middleware::{
    guarded_service, stack, ChannelLayer, CooldownLayer, GateLayer, GateService,
    Invocation, PrivilegeLayer, Scope,
};

/// How a command's aliases are computed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasPolicy {
    /// Reachable under both the local and the qualified name.
    #[default]
    BothNames,
    /// Reachable under the qualified name only; the bare-name slot is
    /// never occupied.
    QualifiedOnly,
    /// Reachable under the local name only.
    LocalOnly,
}

/// The type-erased callback a command runs.
pub type CommandCallback =
    Arc<dyn Fn(Arc<Context>, BoundArgs) -> TriggerFuture + Send + Sync>;

/// A handler triggered when an inbound line starts with the global prefix
/// followed by one of its aliases. The rest of the line is the raw
/// argument string, parsed against the declared signature before the gate
/// stack runs.
pub struct CommandHandler {
    namespace: String,
    name: String,
    policy: AliasPolicy,
    extra_aliases: Vec<String>,
    signature: Signature,
    gate: GateService,
    registered: AtomicBool,
}

impl CommandHandler {
    pub fn builder(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> CommandBuilder {
        CommandBuilder {
            namespace: namespace.into(),
            name: name.into(),
            policy: AliasPolicy::default(),
            extra_aliases: Vec::new(),
            signature: Signature::new(),
            gates: Vec::new(),
        }
    }

    /// The alias set this command occupies, per its policy.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = match self.policy {
            AliasPolicy::BothNames => {
                vec![self.name.clone(), self.qualified_name()]
            }
            AliasPolicy::QualifiedOnly => vec![self.qualified_name()],
            AliasPolicy::LocalOnly => vec![self.name.clone()],
        };
        aliases.extend(self.extra_aliases.iter().cloned());
        aliases
    }
}

#[async_trait]
impl Handler for CommandHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn register(self: Arc<Self>, bus: &Bus) -> String {
        let aliases = self.aliases();
        bus.add_command(self.clone(), &aliases);
        self.registered.store(true, Ordering::SeqCst);
        format!("aliases = {aliases:?}")
    }

    fn unregister(self: Arc<Self>, bus: &Bus) {
        bus.remove_command(&self.aliases(), &self.qualified_name());
        self.registered.store(false, Ordering::SeqCst);
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn actuate(self: Arc<Self>, ctx: Arc<Context>, raw: &str) -> Outcome {
        let (args, admin) = match bind(&self.signature, raw) {
            Ok(bound) => bound,
            Err(failure) => {
                return Outcome::error(format!(
                    "{}: {failure}",
                    self.qualified_name()
                ));
            }
        };

        if ctx.privilege() >= Privilege::Admin {
            admin.apply(&ctx);
        }

        let gate = self.gate.clone();
        match gate.oneshot(Invocation { ctx, args }).await {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }
}

/// Builder for [`CommandHandler`]. Gates are applied in the order they
/// are declared, first declared outermost.
pub struct CommandBuilder {
    namespace: String,
    name: String,
    policy: AliasPolicy,
    extra_aliases: Vec<String>,
    signature: Signature,
    gates: Vec<GateLayer>,
}

impl CommandBuilder {
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn alias_policy(mut self, policy: AliasPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// An extra alias on top of whatever the policy yields.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.extra_aliases.push(alias.into());
        self
    }

    /// Gate: require at least this privilege.
    pub fn restrict(mut self, min: Privilege) -> Self {
        self.gates.push(GateLayer::Privilege(PrivilegeLayer::at_least(min)));
        self
    }

    /// Gate: per-channel cooldown with moderators exempt.
    pub fn cooldown(self, window: Duration) -> Self {
        self.cooldown_with(window, Privilege::Moderator, Scope::Channel)
    }

    /// Gate: cooldown with explicit exemption level and scope.
    pub fn cooldown_with(
        mut self,
        window: Duration,
        exempt: Privilege,
        scope: Scope,
    ) -> Self {
        let id: Arc<str> = format!("{}.{}", self.namespace, self.name).into();
        self.gates.push(GateLayer::Cooldown(
            CooldownLayer::new(id, window).exempt(exempt).scope(scope),
        ));
        self
    }

    /// Gate: only run in these channels.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gates.push(GateLayer::Channel(ChannelLayer::allow(
            channels.into_iter().map(Into::into),
        )));
        self
    }

    /// Finalizes the command with its callback.
    pub fn handler<F, Fut>(self, callback: F) -> Arc<CommandHandler>
    where
        F: Fn(Arc<Context>, BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::handler::TriggerResult> + Send + 'static,
    {
        let callback: CommandCallback =
            Arc::new(move |ctx, args| Box::pin(callback(ctx, args)));
        let base = guarded_service(Arc::new(move |invocation: Invocation| {
            callback(invocation.ctx, invocation.args)
        }));
        Arc::new(CommandHandler {
            namespace: self.namespace,
            name: self.name,
            policy: self.policy,
            extra_aliases: self.extra_aliases,
            signature: self.signature,
            gate: stack(&self.gates, base),
            registered: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgType;
    use crate::testing::{context_on, context_with_author, RecordingConnector};
    use ziggurat_core::{OutcomeCode, RoleFlags};

    fn echo_command() -> Arc<CommandHandler> {
        CommandHandler::builder("meta", "echo")
            .signature(Signature::new().required("text", ArgType::Str))
            .handler(|_ctx, args| async move {
                Ok(Outcome::say(args.str("text")?.to_string()))
            })
    }

    #[tokio::test]
    async fn parse_failure_reports_and_skips_body() {
        let cmd = echo_command();
        let ctx = context_with_author("lobby", "alice", RoleFlags::none());
        let out = cmd.actuate(ctx, "").await;
        assert_eq!(out.code(), OutcomeCode::Error);
        assert!(out.fault().unwrap().contains("meta.echo"));
        assert!(out.fault().unwrap().contains("text"));
    }

    #[tokio::test]
    async fn bound_args_reach_the_callback() {
        let cmd = echo_command();
        let ctx = context_with_author("lobby", "alice", RoleFlags::none());
        let out = cmd.actuate(ctx, r#""hello there""#).await;
        assert_eq!(out, Outcome::say("hello there"));
    }

    #[tokio::test]
    async fn contract_violation_yields_malformed() {
        let cmd = CommandHandler::builder("meta", "broken")
            .handler(|_ctx, args| async move {
                // Reads a parameter the signature never declared.
                Ok(Outcome::say(args.str("ghost")?.to_string()))
            });
        let ctx = context_with_author("lobby", "alice", RoleFlags::none());
        let out = cmd.actuate(ctx, "").await;
        assert_eq!(out.code(), OutcomeCode::Malformed);
    }

    #[tokio::test]
    async fn panicking_body_yields_uncaught() {
        let cmd = CommandHandler::builder("meta", "kaboom")
            .handler(|_ctx, _args| async move { panic!("kaboom") });
        let ctx = context_with_author("lobby", "alice", RoleFlags::none());
        let out = cmd.actuate(ctx, "").await;
        assert_eq!(out.code(), OutcomeCode::Uncaught);
    }

    #[tokio::test]
    async fn admin_redirect_applies_only_to_admins() {
        let cmd = echo_command();

        let connector = RecordingConnector::new();
        let admin = context_on(
            connector.clone(),
            "lobby",
            "root",
            RoleFlags::none(),
            &["root"],
        );
        cmd.clone().actuate(admin.clone(), "-_ch elsewhere hi").await;
        assert_eq!(admin.reply_channel(), "elsewhere");

        let pleb = context_on(
            connector,
            "lobby",
            "alice",
            RoleFlags::none(),
            &[],
        );
        cmd.actuate(pleb.clone(), "-_ch elsewhere hi").await;
        assert_eq!(pleb.reply_channel(), "lobby");
    }

    #[tokio::test]
    async fn admin_mute_keeps_the_outcome_code() {
        let cmd = echo_command();
        let ctx = context_with_author("lobby", "root", RoleFlags::none());
        // Not an admin: the flag is stripped but ignored either way.
        let out = cmd.clone().actuate(ctx, "-_mute hi").await;
        assert_eq!(out.code(), OutcomeCode::Ok);

        let admin = context_on(
            RecordingConnector::new(),
            "lobby",
            "root",
            RoleFlags::none(),
            &["root"],
        );
        let out = cmd.actuate(admin.clone(), "-_mute hi").await;
        assert_eq!(out.code(), OutcomeCode::Ok);
        assert!(admin.is_muted());
    }

    #[test]
    fn alias_policies() {
        let both = echo_command();
        assert_eq!(both.aliases(), vec!["echo".to_string(), "meta.echo".to_string()]);

        let qualified = CommandHandler::builder("meta", "echo")
            .alias_policy(AliasPolicy::QualifiedOnly)
            .handler(|_ctx, _args| async move { Ok(Outcome::ok()) });
        assert_eq!(qualified.aliases(), vec!["meta.echo".to_string()]);

        let local = CommandHandler::builder("meta", "echo")
            .alias_policy(AliasPolicy::LocalOnly)
            .alias("hello")
            .handler(|_ctx, _args| async move { Ok(Outcome::ok()) });
        assert_eq!(local.aliases(), vec!["echo".to_string(), "hello".to_string()]);
    }
}
