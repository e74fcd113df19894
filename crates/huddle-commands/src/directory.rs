//! Member lookup used to resolve `@mentions`.

use huddle_proto::{ChannelId, UserId};

/// A resolved workspace member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Member id
    pub id: UserId,
    /// Display name
    pub display: String,
}

/// Resolves mention text to a member of a channel.
pub trait MemberDirectory {
    /// Member of `channel` matching `reference` (the mention without its
    /// marker), if any.
    fn resolve_member(&self, channel: &ChannelId, reference: &str) -> Option<MemberRef>;
}
