//! The ordered capability ladder of an invoking identity.

use crate::chat::Chatter;

/// Privilege levels, lowest to highest.
///
/// Computed per invocation from platform role flags plus the configured
/// operator list; never persisted. [`Nobody`](Privilege::Nobody) sits above
/// everything and is never granted - it exists so a gate can be declared
/// that nothing short of an explicit bypass satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Pleb,
    Subscriber,
    Vip,
    Moderator,
    Ambassador,
    Broadcaster,
    Admin,
    Nobody,
}

impl Privilege {
    /// Computes the privilege of a chatter, highest role wins.
    ///
    /// Operators are pinned to [`Admin`](Privilege::Admin) regardless of
    /// their role flags in the invoking channel.
    pub fn of(chatter: &Chatter, operators: &[String]) -> Self {
        if operators.iter().any(|op| op == &chatter.name) {
            return Privilege::Admin;
        }
        let roles = chatter.roles;
        if roles.broadcaster {
            Privilege::Broadcaster
        } else if roles.moderator {
            Privilege::Moderator
        } else if roles.vip {
            Privilege::Vip
        } else if roles.subscriber {
            Privilege::Subscriber
        } else {
            Privilege::Pleb
        }
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Privilege::Pleb => "pleb",
            Privilege::Subscriber => "subscriber",
            Privilege::Vip => "vip",
            Privilege::Moderator => "moderator",
            Privilege::Ambassador => "ambassador",
            Privilege::Broadcaster => "broadcaster",
            Privilege::Admin => "admin",
            Privilege::Nobody => "nobody",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::RoleFlags;

    fn chatter(name: &str, roles: RoleFlags) -> Chatter {
        Chatter::new(name, roles)
    }

    #[test]
    fn highest_role_wins() {
        let roles = RoleFlags {
            subscriber: true,
            vip: true,
            moderator: true,
            broadcaster: false,
        };
        assert_eq!(Privilege::of(&chatter("a", roles), &[]), Privilege::Moderator);
    }

    #[test]
    fn operator_is_pinned_to_admin() {
        let ops = vec!["root".to_string()];
        assert_eq!(
            Privilege::of(&chatter("root", RoleFlags::none()), &ops),
            Privilege::Admin
        );
        assert_eq!(
            Privilege::of(&chatter("someone", RoleFlags::none()), &ops),
            Privilege::Pleb
        );
    }

    #[test]
    fn ladder_is_ordered() {
        assert!(Privilege::Pleb < Privilege::Subscriber);
        assert!(Privilege::Broadcaster < Privilege::Admin);
        assert!(Privilege::Admin < Privilege::Nobody);
    }
}
