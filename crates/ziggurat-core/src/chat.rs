//! The inbound chat model.
//!
//! A [`ChatLine`] is the record the platform connector delivers for every
//! chat message, including the bot's own echoed lines. Role flags travel
//! with the author so privilege can be computed per invocation without
//! reaching back into the platform client.

/// Platform role flags attached to a chatter in a specific channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleFlags {
    pub subscriber: bool,
    pub vip: bool,
    pub moderator: bool,
    pub broadcaster: bool,
}

impl RoleFlags {
    /// Flags for an identity with no roles at all.
    pub fn none() -> Self {
        Self::default()
    }
}

/// The author of a chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chatter {
    pub name: String,
    pub roles: RoleFlags,
}

impl Chatter {
    pub fn new(name: impl Into<String>, roles: RoleFlags) -> Self {
        Self {
            name: name.into(),
            roles,
        }
    }

    /// A roleless chatter, as used for synthetic self-authored lines.
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, RoleFlags::none())
    }
}

/// One inbound chat line: channel, author identity with role flags, text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub channel: String,
    pub author: Chatter,
    pub text: String,
}

impl ChatLine {
    pub fn new(
        channel: impl Into<String>,
        author: Chatter,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            author,
            text: text.into(),
        }
    }

    /// A synthetic self-authored line, used by scheduled ticks that run
    /// without any real inbound message behind them.
    pub fn synthetic(bot_name: &str, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            author: Chatter::plain(bot_name),
            text: String::new(),
        }
    }
}
