// =============================================================================
// Conclave Federated Room Server - Auth Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The authorization rules engine. Pure and deterministic: every check
//   reads only the candidate event and the supplied auth events, never
//   storage, so the same inputs always produce the same verdict.
//
// Architecture:
//   • Async/await native implementation
//   • Single writer per room, parallel across rooms
//   • Append-only storage with monotonic numeric identifiers
//
// Dependencies:
//   • Tokio async runtime
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix protocol types with ruma
//
// References:
//   • Matrix.org specification: https://matrix.org/
//   • Matrix spec: https://spec.matrix.org/
//
// =============================================================================

pub mod content;

use std::{collections::HashMap, sync::Arc};

use ruma::{
    events::{room::member::MembershipState, TimelineEventType},
    UserId,
};

use self::content::{CreateContent, JoinRuleContent, MemberContent, PowerLevelContent};
use crate::{service::pdu::PduEvent, utils, Error, Result};

const JOIN_RULE_PUBLIC: &str = "public";
const JOIN_RULE_INVITE: &str = "invite";

/// The event types and state keys needed to authenticate an event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateNeeded {
    /// Is the m.room.create event needed to auth the event.
    pub create: bool,
    /// Is the m.room.join_rules event needed to auth the event.
    pub join_rules: bool,
    /// Is the m.room.power_levels event needed to auth the event.
    pub power_levels: bool,
    /// List of m.room.member state_keys needed to auth the event.
    pub member: Vec<String>,
    /// List of m.room.third_party_invite state_keys.
    pub third_party_invite: Vec<String>,
}

impl StateNeeded {
    pub fn is_empty(&self) -> bool {
        !self.create
            && !self.join_rules
            && !self.power_levels
            && self.member.is_empty()
            && self.third_party_invite.is_empty()
    }

    /// The `(event type, state key)` tuples this set names.
    pub fn tuples(&self) -> Vec<(TimelineEventType, String)> {
        let mut tuples = Vec::new();
        if self.create {
            tuples.push((TimelineEventType::RoomCreate, String::new()));
        }
        if self.join_rules {
            tuples.push((TimelineEventType::RoomJoinRules, String::new()));
        }
        if self.power_levels {
            tuples.push((TimelineEventType::RoomPowerLevels, String::new()));
        }
        for state_key in &self.member {
            tuples.push((TimelineEventType::RoomMember, state_key.clone()));
        }
        for state_key in &self.third_party_invite {
            tuples.push((TimelineEventType::RoomThirdPartyInvite, state_key.clone()));
        }
        tuples
    }
}

/// Returns the event types and state keys needed to authenticate the given
/// events. Takes a batch so state conflict resolution can compute one
/// combined set for all conflicted events.
pub fn state_needed_for_auth(events: &[&PduEvent]) -> StateNeeded {
    let mut result = StateNeeded::default();
    let mut members = Vec::new();
    let mut third_party_invites = Vec::new();

    for event in events {
        match event.kind {
            TimelineEventType::RoomCreate => {
                // The create event requires no state to authenticate.
            }
            TimelineEventType::RoomAliases => {
                // Alias events only need the create event.
                result.create = true;
            }
            TimelineEventType::RoomMember => {
                // Member events need the previous membership of the target,
                // the current membership of the sender, the power levels,
                // the join rules when joining and optionally a third party
                // invite event.
                let content = match MemberContent::from_event(event) {
                    Ok(content) => content,
                    // Bad content is reported when the event is actually
                    // checked; it contributes nothing here.
                    Err(_) => continue,
                };
                result.create = true;
                result.power_levels = true;
                if let Some(state_key) = &event.state_key {
                    members.push(event.sender.as_str().to_owned());
                    members.push(state_key.clone());
                }
                if content.membership == MembershipState::Join {
                    result.join_rules = true;
                }
                if let Some(data) = &content.third_party_invite {
                    match content::third_party_invite_token(data) {
                        Ok(token) => third_party_invites.push(token),
                        Err(_) => continue,
                    }
                }
            }
            _ => {
                // Everything else needs the membership of the sender and the
                // power levels.
                result.create = true;
                result.power_levels = true;
                members.push(event.sender.as_str().to_owned());
            }
        }
    }

    members.sort_unstable();
    members.dedup();
    result.member = members;

    third_party_invites.sort_unstable();
    third_party_invites.dedup();
    result.third_party_invite = third_party_invites;

    result
}

/// Capability handing the rules engine the state events needed to
/// authenticate an event, on demand.
pub trait AuthEvents {
    /// The m.room.create event for the room.
    fn create(&self) -> Result<Option<Arc<PduEvent>>>;
    /// The m.room.join_rules event for the room.
    fn join_rules(&self) -> Result<Option<Arc<PduEvent>>>;
    /// The m.room.power_levels event for the room.
    fn power_levels(&self) -> Result<Option<Arc<PduEvent>>>;
    /// The m.room.member event for the given user id state_key.
    fn member(&self, state_key: &str) -> Result<Option<Arc<PduEvent>>>;
    /// The m.room.third_party_invite event for the given token state_key.
    fn third_party_invite(&self, state_key: &str) -> Result<Option<Arc<PduEvent>>>;
}

/// Auth events assembled from a materialized state snapshot.
#[derive(Clone, Debug, Default)]
pub struct AuthEventMap {
    events: HashMap<(String, String), Arc<PduEvent>>,
}

impl AuthEventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state event to the map, keyed by its state tuple.
    pub fn insert(&mut self, event: Arc<PduEvent>) -> Result<()> {
        let state_key = event.state_key.clone().ok_or_else(|| {
            Error::InvalidEvent(format!("auth event {} has no state key", event.event_id))
        })?;
        self.events
            .insert((event.kind.to_string(), state_key), event);
        Ok(())
    }

    fn get(&self, event_type: &str, state_key: &str) -> Option<Arc<PduEvent>> {
        self.events
            .get(&(event_type.to_owned(), state_key.to_owned()))
            .cloned()
    }
}

impl AuthEvents for AuthEventMap {
    fn create(&self) -> Result<Option<Arc<PduEvent>>> {
        Ok(self.get("m.room.create", ""))
    }

    fn join_rules(&self) -> Result<Option<Arc<PduEvent>>> {
        Ok(self.get("m.room.join_rules", ""))
    }

    fn power_levels(&self) -> Result<Option<Arc<PduEvent>>> {
        Ok(self.get("m.room.power_levels", ""))
    }

    fn member(&self, state_key: &str) -> Result<Option<Arc<PduEvent>>> {
        Ok(self.get("m.room.member", state_key))
    }

    fn third_party_invite(&self, state_key: &str) -> Result<Option<Arc<PduEvent>>> {
        Ok(self.get("m.room.third_party_invite", state_key))
    }
}

/// Checks whether an event is allowed by the auth events. Returns
/// `Error::NotAllowed` with the failing rule when it is not.
pub fn allowed(event: &PduEvent, auth_events: &dyn AuthEvents) -> Result<()> {
    match event.kind {
        TimelineEventType::RoomCreate => create_event_allowed(event),
        TimelineEventType::RoomAliases => alias_event_allowed(event, auth_events),
        TimelineEventType::RoomMember => member_event_allowed(event, auth_events),
        TimelineEventType::RoomPowerLevels => power_levels_event_allowed(event, auth_events),
        TimelineEventType::RoomRedaction => redact_event_allowed(event, auth_events),
        _ => default_event_allowed(event, auth_events),
    }
}

fn create_event_allowed(event: &PduEvent) -> Result<()> {
    if !event.state_key_equals("") {
        return Err(Error::NotAllowed(format!(
            "create event state key is not empty: {:?}",
            event.state_key
        )));
    }
    let room_id_domain = utils::domain_from_id(event.room_id.as_str())?;
    let sender_domain = utils::domain_from_id(event.sender.as_str())?;
    if sender_domain != room_id_domain {
        return Err(Error::NotAllowed(format!(
            "create event room ID domain does not match sender: {room_id_domain:?} != {sender_domain:?}"
        )));
    }
    if !event.prev_events.is_empty() {
        return Err(Error::NotAllowed(format!(
            "create event must be the first event in the room: found {} prev_events",
            event.prev_events.len()
        )));
    }
    Ok(())
}

fn member_event_allowed(event: &PduEvent, auth_events: &dyn AuthEvents) -> Result<()> {
    let allower = MembershipAllower::new(auth_events, event)?;
    allower.membership_allowed(event)
}

/// Alias events are per-server: any server may publish aliases for its own
/// domain without being in the room, so the rules are looser than the
/// default checks.
fn alias_event_allowed(event: &PduEvent, auth_events: &dyn AuthEvents) -> Result<()> {
    let create = CreateContent::from_auth_events(auth_events)?;
    let sender_domain = utils::domain_from_id(event.sender.as_str())?;

    if event.room_id != create.room_id {
        return Err(Error::NotAllowed(format!(
            "create event has different room_id: {} != {}",
            event.room_id, create.room_id
        )));
    }

    create.domain_allowed(sender_domain)?;

    if !event.state_key_equals(sender_domain) {
        return Err(Error::NotAllowed(format!(
            "alias state_key does not match sender domain, {:?} != {:?}",
            sender_domain, event.state_key
        )));
    }

    Ok(())
}

fn power_levels_event_allowed(event: &PduEvent, auth_events: &dyn AuthEvents) -> Result<()> {
    let allower = EventAllower::new(auth_events, &event.sender)?;
    allower.common_checks(event)?;

    let new_power_levels = PowerLevelContent::from_event(event)?;

    // Every key in the users map must be a syntactically valid user id.
    for user_id in new_power_levels.user_levels.keys() {
        if UserId::parse(user_id.as_str()).is_err() {
            return Err(Error::NotAllowed(format!("not a valid user ID: {user_id:?}")));
        }
    }

    // The first power levels event in a room may set the levels to any
    // value it wants.
    if auth_events.power_levels()?.is_none() {
        return Ok(());
    }

    let old_power_levels = &allower.power_levels;
    let sender_level = old_power_levels.user_level(event.sender.as_str());

    check_event_levels(sender_level, old_power_levels, &new_power_levels)?;
    check_user_levels(
        sender_level,
        event.sender.as_str(),
        old_power_levels,
        &new_power_levels,
    )
}

/// Checks that the changes in event levels are allowed: a sender may change
/// a level only if both the old and the new value are within their own.
fn check_event_levels(
    sender_level: i64,
    old: &PowerLevelContent,
    new: &PowerLevelContent,
) -> Result<()> {
    let mut level_checks = vec![
        (old.ban_level, new.ban_level),
        (old.invite_level, new.invite_level),
        (old.kick_level, new.kick_level),
        (old.redact_level, new.redact_level),
        (old.state_default_level, new.state_default_level),
        (old.event_default_level, new.event_default_level),
    ];

    // Missing entries on either side fall back to the non-state default.
    // Keys present in both maps are checked twice, which is harmless.
    for event_type in new.event_levels.keys().chain(old.event_levels.keys()) {
        level_checks.push((
            old.event_level(event_type, false),
            new.event_level(event_type, false),
        ));
    }

    for (old_level, new_level) in level_checks {
        if old_level == new_level {
            continue;
        }
        if sender_level < new_level {
            return Err(Error::NotAllowed(format!(
                "sender with level {sender_level} is not allowed to change level from \
                 {old_level} to {new_level} because the new level is above the level of the sender"
            )));
        }
        if sender_level < old_level {
            return Err(Error::NotAllowed(format!(
                "sender with level {sender_level} is not allowed to change level from \
                 {old_level} to {new_level} because the current level is above the level of the sender"
            )));
        }
    }

    Ok(())
}

/// Checks that the changes in user levels are allowed. Users may always
/// reduce their own level; changing anybody else requires the old level to
/// be strictly below the sender's.
fn check_user_levels(
    sender_level: i64,
    sender_id: &str,
    old: &PowerLevelContent,
    new: &PowerLevelContent,
) -> Result<()> {
    let mut user_level_checks = vec![(
        old.user_default_level,
        new.user_default_level,
        None::<&str>,
    )];

    for user_id in new.user_levels.keys().chain(old.user_levels.keys()) {
        user_level_checks.push((
            old.user_level(user_id),
            new.user_level(user_id),
            Some(user_id.as_str()),
        ));
    }

    for (old_level, new_level, user_id) in user_level_checks {
        if old_level == new_level {
            continue;
        }
        if sender_level < new_level {
            return Err(Error::NotAllowed(format!(
                "sender with level {sender_level} is not allowed to change user level from \
                 {old_level} to {new_level} because the new level is above the level of the sender"
            )));
        }
        if user_id == Some(sender_id) {
            // The previous check guarantees this is a reduction, which users
            // may always apply to themselves.
            continue;
        }
        if sender_level <= old_level {
            return Err(Error::NotAllowed(format!(
                "sender with level {sender_level} is not allowed to change user level from \
                 {old_level} to {new_level} because the old level is equal to or above the level of the sender"
            )));
        }
    }

    Ok(())
}

fn redact_event_allowed(event: &PduEvent, auth_events: &dyn AuthEvents) -> Result<()> {
    let allower = EventAllower::new(auth_events, &event.sender)?;
    allower.common_checks(event)?;

    let redacts = event.redacts.as_ref().ok_or_else(|| {
        Error::InvalidEvent("redaction event has no redacts field".to_owned())
    })?;

    let sender_domain = utils::domain_from_id(event.sender.as_str())?;
    let redact_domain = utils::domain_from_id(redacts.as_str())?;

    // Servers may always redact their own events. Which user sent the target
    // is unknown here, so the domain comparison is the only possible check;
    // the finer user-level rules are left to the sending server.
    if sender_domain == redact_domain {
        return Ok(());
    }

    let sender_level = allower.power_levels.user_level(event.sender.as_str());
    let redact_level = allower.power_levels.redact_level;
    if sender_level >= redact_level {
        return Ok(());
    }

    Err(Error::NotAllowed(format!(
        "{:?} is not allowed to redact message from {:?}. {} < {}",
        event.sender.as_str(),
        redact_domain,
        sender_level,
        redact_level
    )))
}

fn default_event_allowed(event: &PduEvent, auth_events: &dyn AuthEvents) -> Result<()> {
    let allower = EventAllower::new(auth_events, &event.sender)?;
    allower.common_checks(event)
}

/// The information needed to authorize all event types other than
/// m.room.create, m.room.member and m.room.aliases, which are special.
struct EventAllower {
    create: CreateContent,
    member: MemberContent,
    power_levels: PowerLevelContent,
}

impl EventAllower {
    fn new(auth_events: &dyn AuthEvents, sender: &UserId) -> Result<Self> {
        let create = CreateContent::from_auth_events(auth_events)?;
        let member = MemberContent::from_auth_events(auth_events, sender.as_str())?;
        let power_levels = PowerLevelContent::from_auth_events(auth_events, create.creator.as_ref())?;
        Ok(Self {
            create,
            member,
            power_levels,
        })
    }

    fn common_checks(&self, event: &PduEvent) -> Result<()> {
        if event.room_id != self.create.room_id {
            return Err(Error::NotAllowed(format!(
                "create event has different room_id: {} != {}",
                event.room_id, self.create.room_id
            )));
        }

        self.create.user_id_allowed(event.sender.as_str())?;

        // The sender must be in the room for every event other than
        // m.room.create, m.room.member and m.room.aliases.
        if self.member.membership != MembershipState::Join {
            return Err(Error::NotAllowed(format!(
                "sender {:?} not in room",
                event.sender.as_str()
            )));
        }

        let sender_level = self.power_levels.user_level(event.sender.as_str());
        let event_level = self
            .power_levels
            .event_level(&event.kind.to_string(), event.is_state());
        if sender_level < event_level {
            return Err(Error::NotAllowed(format!(
                "sender {:?} is not allowed to send event. {} < {}",
                event.sender.as_str(),
                sender_level,
                event_level
            )));
        }

        // State keys beginning with '@' belong to the user they name and may
        // only be set by that user.
        if let Some(state_key) = &event.state_key {
            if state_key.starts_with('@') && state_key != event.sender.as_str() {
                return Err(Error::NotAllowed(format!(
                    "sender {:?} is not allowed to modify the state belonging to {state_key:?}",
                    event.sender.as_str()
                )));
            }
        }

        // TODO: enforce the remaining reserved state_key prefixes once the
        // rest of the ecosystem checks them too.

        Ok(())
    }
}

/// The information needed to authenticate an m.room.member event, which has
/// different rules from ordinary events.
struct MembershipAllower {
    /// The user whose membership is changing.
    target_id: String,
    /// The user who sent the membership event.
    sender_id: String,
    /// The membership of the sender.
    sender_member: MemberContent,
    /// The previous membership of the target.
    old_member: MemberContent,
    /// The membership of the target if this event is accepted.
    new_member: MemberContent,
    create: CreateContent,
    power_levels: PowerLevelContent,
    join_rule: JoinRuleContent,
}

impl MembershipAllower {
    fn new(auth_events: &dyn AuthEvents, event: &PduEvent) -> Result<Self> {
        let target_id = event
            .state_key
            .clone()
            .ok_or_else(|| Error::NotAllowed("m.room.member must be a state event".to_owned()))?;

        let create = CreateContent::from_auth_events(auth_events)?;
        let new_member = MemberContent::from_event(event)?;
        let old_member = MemberContent::from_auth_events(auth_events, &target_id)?;
        let sender_member = MemberContent::from_auth_events(auth_events, event.sender.as_str())?;
        let power_levels = PowerLevelContent::from_auth_events(auth_events, create.creator.as_ref())?;
        // The join rules only matter when the proposed membership is "join".
        let join_rule = if new_member.membership == MembershipState::Join {
            JoinRuleContent::from_auth_events(auth_events)?
        } else {
            JoinRuleContent::default()
        };

        Ok(Self {
            target_id,
            sender_id: event.sender.as_str().to_owned(),
            sender_member,
            old_member,
            new_member,
            create,
            power_levels,
            join_rule,
        })
    }

    fn membership_allowed(&self, event: &PduEvent) -> Result<()> {
        if event.room_id != self.create.room_id {
            return Err(Error::NotAllowed(format!(
                "create event has different room_id: {} != {}",
                event.room_id, self.create.room_id
            )));
        }
        self.create.user_id_allowed(&self.sender_id)?;
        self.create.user_id_allowed(&self.target_id)?;

        // The room creator's first join happens before any membership state
        // exists, so it is special-cased directly against the create event.
        if Some(self.target_id.as_str()) == self.create.creator.as_ref().map(|c| c.as_str())
            && self.new_member.membership == MembershipState::Join
            && self.sender_id == self.target_id
            && event.prev_events.len() == 1
            && event.prev_events[0].event_id.as_str() == self.create.event_id.as_str()
        {
            return Ok(());
        }

        if self.new_member.membership == MembershipState::Invite
            && self.new_member.third_party_invite.is_some()
        {
            // TODO: verify the signed third party invite token against the
            // m.room.third_party_invite event. Hard failure until then so
            // these can never be silently accepted.
            return Err(Error::Internal(
                "third party invites are not implemented".to_owned(),
            ));
        }

        if self.target_id == self.sender_id {
            self.membership_allowed_self()
        } else {
            self.membership_allowed_other()
        }
    }

    /// Changes a user makes to their own membership.
    fn membership_allowed_self(&self) -> Result<()> {
        if self.new_member.membership == MembershipState::Join {
            // A user not in the room may join if the room is public.
            if self.old_member.membership == MembershipState::Leave
                && self.join_rule.join_rule == JOIN_RULE_PUBLIC
            {
                return Ok(());
            }
            // An invited user may join whether the rule is invite or public.
            if self.old_member.membership == MembershipState::Invite
                && (self.join_rule.join_rule == JOIN_RULE_PUBLIC
                    || self.join_rule.join_rule == JOIN_RULE_INVITE)
            {
                return Ok(());
            }
            // A joined user may update their join.
            if self.old_member.membership == MembershipState::Join {
                return Ok(());
            }
        }
        if self.new_member.membership == MembershipState::Leave {
            // A joined user may leave; an invited user may reject the invite.
            if self.old_member.membership == MembershipState::Join
                || self.old_member.membership == MembershipState::Invite
            {
                return Ok(());
            }
        }
        self.membership_failed()
    }

    /// Changes a user makes to the membership of somebody else.
    fn membership_allowed_other(&self) -> Result<()> {
        let sender_level = self.power_levels.user_level(&self.sender_id);
        let target_level = self.power_levels.user_level(&self.target_id);

        // Only room members may modify the membership of other users.
        if self.sender_member.membership != MembershipState::Join {
            return Err(Error::NotAllowed(format!(
                "sender {:?} is not in the room",
                self.sender_id
            )));
        }

        if self.new_member.membership == MembershipState::Ban {
            if sender_level >= self.power_levels.ban_level && sender_level > target_level {
                return Ok(());
            }
        }
        if self.new_member.membership == MembershipState::Leave {
            // Unbanning does not compare target levels; a user above your
            // own level can be unbanned.
            if self.old_member.membership == MembershipState::Ban
                && sender_level >= self.power_levels.ban_level
            {
                return Ok(());
            }
            // Kicks of users that already left stay allowed.
            if self.old_member.membership != MembershipState::Ban
                && sender_level >= self.power_levels.kick_level
                && sender_level > target_level
            {
                return Ok(());
            }
        }
        if self.new_member.membership == MembershipState::Invite {
            if (self.old_member.membership == MembershipState::Leave
                || self.old_member.membership == MembershipState::Invite)
                && sender_level >= self.power_levels.invite_level
            {
                return Ok(());
            }
        }

        self.membership_failed()
    }

    fn membership_failed(&self) -> Result<()> {
        if self.sender_id == self.target_id {
            return Err(Error::NotAllowed(format!(
                "{:?} is not allowed to change their membership from {:?} to {:?}",
                self.target_id, self.old_member.membership, self.new_member.membership
            )));
        }

        Err(Error::NotAllowed(format!(
            "{:?} is not allowed to change the membership of {:?} from {:?} to {:?}",
            self.sender_id, self.target_id, self.old_member.membership, self.new_member.membership
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Arc<PduEvent> {
        Arc::new(PduEvent::parse(value.to_string().as_bytes()).expect("test event parses"))
    }

    fn create_event() -> Arc<PduEvent> {
        parse(json!({
            "event_id": "$create:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.create",
            "state_key": "",
            "content": {"creator": "@a:x"},
            "prev_events": [],
            "depth": 0,
        }))
    }

    fn member_event(user: &str, membership: &str, depth: u64) -> Arc<PduEvent> {
        parse(json!({
            "event_id": format!("$member-{}-{}:x", membership, user.trim_start_matches('@').replace(':', "-")),
            "room_id": "!r:x",
            "sender": user,
            "type": "m.room.member",
            "state_key": user,
            "content": {"membership": membership},
            "prev_events": ["$create:x"],
            "depth": depth,
        }))
    }

    fn power_levels_event(users: serde_json::Value) -> Arc<PduEvent> {
        parse(json!({
            "event_id": "$power:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.power_levels",
            "state_key": "",
            "content": {"users": users},
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        }))
    }

    fn room_with_members(members: &[(&str, &str)]) -> AuthEventMap {
        let mut map = AuthEventMap::new();
        map.insert(create_event()).unwrap();
        for (user, membership) in members {
            map.insert(member_event(user, membership, 1)).unwrap();
        }
        map
    }

    #[test]
    fn test_create_event_allowed() {
        assert!(allowed(&create_event(), &AuthEventMap::new()).is_ok());
    }

    #[test]
    fn test_create_event_domain_mismatch_rejected() {
        let event = parse(json!({
            "event_id": "$create:y",
            "room_id": "!r:y",
            "sender": "@a:x",
            "type": "m.room.create",
            "state_key": "",
            "content": {"creator": "@a:x"},
            "prev_events": [],
            "depth": 0,
        }));
        assert!(matches!(
            allowed(&event, &AuthEventMap::new()),
            Err(Error::NotAllowed(_))
        ));
    }

    #[test]
    fn test_create_event_with_prev_events_rejected() {
        let event = parse(json!({
            "event_id": "$create2:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.create",
            "state_key": "",
            "content": {},
            "prev_events": ["$create:x"],
            "depth": 1,
        }));
        assert!(allowed(&event, &AuthEventMap::new()).is_err());
    }

    #[test]
    fn test_creator_bootstrap_join_allowed() {
        // The creator joins right after the create event, before any
        // membership exists.
        let mut map = AuthEventMap::new();
        map.insert(create_event()).unwrap();
        let join = member_event("@a:x", "join", 1);
        assert!(allowed(&join, &map).is_ok());
    }

    #[test]
    fn test_join_public_room_allowed() {
        let mut map = room_with_members(&[("@a:x", "join")]);
        map.insert(parse(json!({
            "event_id": "$rules:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.join_rules",
            "state_key": "",
            "content": {"join_rule": "public"},
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        })))
        .unwrap();

        let join = member_event("@b:x", "join", 3);
        assert!(allowed(&join, &map).is_ok());
    }

    #[test]
    fn test_join_invite_only_room_without_invite_rejected() {
        let map = room_with_members(&[("@a:x", "join")]);
        // No join_rules event: the default rule is invite.
        let join = member_event("@b:x", "join", 3);
        assert!(matches!(allowed(&join, &map), Err(Error::NotAllowed(_))));
    }

    #[test]
    fn test_invited_user_may_join_and_leave() {
        let mut map = room_with_members(&[("@a:x", "join")]);
        map.insert(parse(json!({
            "event_id": "$invite-b:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.member",
            "state_key": "@b:x",
            "content": {"membership": "invite"},
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        })))
        .unwrap();

        let join = member_event("@b:x", "join", 3);
        assert!(allowed(&join, &map).is_ok());

        let leave = member_event("@b:x", "leave", 3);
        assert!(allowed(&leave, &map).is_ok());
    }

    #[test]
    fn test_invite_requires_invite_level() {
        let mut map = room_with_members(&[("@a:x", "join"), ("@b:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100, "@b:x": 0})))
            .unwrap();

        let invite = parse(json!({
            "event_id": "$invite-c:x",
            "room_id": "!r:x",
            "sender": "@b:x",
            "type": "m.room.member",
            "state_key": "@c:x",
            "content": {"membership": "invite"},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        // Invite level defaults to 50, @b:x has 0.
        assert!(allowed(&invite, &map).is_err());
    }

    #[test]
    fn test_ban_requires_higher_level_than_target() {
        let mut map = room_with_members(&[("@a:x", "join"), ("@b:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100, "@b:x": 100})))
            .unwrap();

        let ban = parse(json!({
            "event_id": "$ban-b:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.member",
            "state_key": "@b:x",
            "content": {"membership": "ban"},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        // Equal levels: ban_level is met but the target is not below the
        // sender.
        assert!(allowed(&ban, &map).is_err());
    }

    #[test]
    fn test_unban_skips_target_level_comparison() {
        let mut map = room_with_members(&[("@a:x", "join")]);
        map.insert(member_event("@b:x", "ban", 2)).unwrap();
        map.insert(power_levels_event(json!({"@a:x": 100, "@b:x": 100})))
            .unwrap();

        let unban = parse(json!({
            "event_id": "$unban-b:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.member",
            "state_key": "@b:x",
            "content": {"membership": "leave"},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(allowed(&unban, &map).is_ok());
    }

    #[test]
    fn test_first_power_levels_accepts_any_values() {
        let map = room_with_members(&[("@a:x", "join")]);
        let power = power_levels_event(json!({"@a:x": 100, "@b:x": 9001}));
        assert!(allowed(&power, &map).is_ok());
    }

    #[test]
    fn test_power_level_self_demotion_allowed() {
        let mut map = room_with_members(&[("@a:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100}))).unwrap();

        let demote = parse(json!({
            "event_id": "$power2:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.power_levels",
            "state_key": "",
            "content": {"users": {"@a:x": 50}},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(allowed(&demote, &map).is_ok());
    }

    #[test]
    fn test_power_level_raise_above_own_rejected() {
        let mut map = room_with_members(&[("@a:x", "join"), ("@b:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100, "@b:x": 50})))
            .unwrap();

        let raise = parse(json!({
            "event_id": "$power3:x",
            "room_id": "!r:x",
            "sender": "@b:x",
            "type": "m.room.power_levels",
            "state_key": "",
            "content": {"users": {"@a:x": 100, "@b:x": 50, "@c:x": 75}},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(matches!(allowed(&raise, &map), Err(Error::NotAllowed(_))));
    }

    #[test]
    fn test_power_level_invalid_user_key_rejected() {
        let mut map = room_with_members(&[("@a:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100}))).unwrap();

        let bad = parse(json!({
            "event_id": "$power4:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.power_levels",
            "state_key": "",
            "content": {"users": {"not-a-user-id": 50}},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(allowed(&bad, &map).is_err());
    }

    #[test]
    fn test_redaction_same_domain_allowed() {
        // @c:y redacts a message from @b:y: different user, same domain,
        // no power needed.
        let mut map = AuthEventMap::new();
        map.insert(parse(json!({
            "event_id": "$create:y",
            "room_id": "!r:y",
            "sender": "@a:y",
            "type": "m.room.create",
            "state_key": "",
            "content": {"creator": "@a:y"},
            "prev_events": [],
            "depth": 0,
        })))
        .unwrap();
        map.insert(parse(json!({
            "event_id": "$member-join-c:y",
            "room_id": "!r:y",
            "sender": "@c:y",
            "type": "m.room.member",
            "state_key": "@c:y",
            "content": {"membership": "join"},
            "prev_events": ["$create:y"],
            "depth": 1,
        })))
        .unwrap();

        let redact = parse(json!({
            "event_id": "$redact:y",
            "room_id": "!r:y",
            "sender": "@c:y",
            "type": "m.room.redaction",
            "content": {},
            "redacts": "$message:y",
            "prev_events": ["$member-join-c:y"],
            "depth": 2,
        }));
        assert!(allowed(&redact, &map).is_ok());
    }

    #[test]
    fn test_redaction_cross_domain_needs_redact_level() {
        let mut map = room_with_members(&[("@a:x", "join"), ("@d:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100, "@d:x": 0})))
            .unwrap();

        let redact = parse(json!({
            "event_id": "$redact:x",
            "room_id": "!r:x",
            "sender": "@d:x",
            "type": "m.room.redaction",
            "content": {},
            "redacts": "$message:z",
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(matches!(allowed(&redact, &map), Err(Error::NotAllowed(_))));

        // The room admin reaches the redact level.
        let admin_redact = parse(json!({
            "event_id": "$redact2:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.redaction",
            "content": {},
            "redacts": "$message:z",
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(allowed(&admin_redact, &map).is_ok());
    }

    #[test]
    fn test_user_scoped_state_key_restricted_to_owner() {
        let mut map = room_with_members(&[("@a:x", "join"), ("@b:x", "join")]);
        map.insert(power_levels_event(json!({"@a:x": 100}))).unwrap();

        // Admin level does not override the '@'-prefix ownership rule.
        let event = parse(json!({
            "event_id": "$custom:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "my.user.setting",
            "state_key": "@b:x",
            "content": {},
            "prev_events": ["$power:x"],
            "depth": 3,
        }));
        assert!(matches!(allowed(&event, &map), Err(Error::NotAllowed(_))));
    }

    #[test]
    fn test_sender_must_be_joined_for_default_events() {
        let map = room_with_members(&[("@a:x", "join")]);
        let message = parse(json!({
            "event_id": "$msg:x",
            "room_id": "!r:x",
            "sender": "@b:x",
            "type": "m.room.message",
            "content": {"body": "hi"},
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        }));
        assert!(matches!(allowed(&message, &map), Err(Error::NotAllowed(_))));
    }

    #[test]
    fn test_alias_event_scoped_to_sender_domain() {
        let map = room_with_members(&[]);

        // A server not in the room may publish aliases for its own domain.
        let alias = parse(json!({
            "event_id": "$alias:z",
            "room_id": "!r:x",
            "sender": "@admin:z",
            "type": "m.room.aliases",
            "state_key": "z",
            "content": {"aliases": ["#room:z"]},
            "prev_events": ["$create:x"],
            "depth": 5,
        }));
        assert!(allowed(&alias, &map).is_ok());

        // But not for somebody else's domain.
        let foreign = parse(json!({
            "event_id": "$alias2:z",
            "room_id": "!r:x",
            "sender": "@admin:z",
            "type": "m.room.aliases",
            "state_key": "x",
            "content": {"aliases": ["#room:x"]},
            "prev_events": ["$create:x"],
            "depth": 5,
        }));
        assert!(allowed(&foreign, &map).is_err());
    }

    #[test]
    fn test_unfederated_room_rejects_remote_senders() {
        let mut map = AuthEventMap::new();
        map.insert(parse(json!({
            "event_id": "$create:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.create",
            "state_key": "",
            "content": {"creator": "@a:x", "m.federate": false},
            "prev_events": [],
            "depth": 0,
        })))
        .unwrap();
        map.insert(member_event("@a:x", "join", 1)).unwrap();

        let join = member_event("@b:y", "join", 2);
        assert!(matches!(allowed(&join, &map), Err(Error::NotAllowed(_))));
    }

    #[test]
    fn test_third_party_invite_is_hard_failure() {
        let map = room_with_members(&[("@a:x", "join")]);
        let invite = parse(json!({
            "event_id": "$tpi:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.member",
            "state_key": "@b:x",
            "content": {
                "membership": "invite",
                "third_party_invite": {"signed": {"token": "tok"}},
            },
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        }));
        assert!(matches!(allowed(&invite, &map), Err(Error::Internal(_))));
    }

    #[test]
    fn test_allowed_is_deterministic() {
        let map = room_with_members(&[("@a:x", "join")]);
        let join = member_event("@b:x", "join", 2);
        let first = allowed(&join, &map).is_ok();
        let second = allowed(&join, &map).is_ok();
        assert_eq!(first, second);
    }

    #[test]
    fn test_state_needed_for_create_is_empty() {
        let create = create_event();
        let needed = state_needed_for_auth(&[&create]);
        assert!(needed.is_empty());
        assert!(needed.tuples().is_empty());
    }

    #[test]
    fn test_state_needed_for_join_includes_join_rules() {
        let join = member_event("@b:x", "join", 2);
        let needed = state_needed_for_auth(&[&join]);
        assert!(needed.create);
        assert!(needed.power_levels);
        assert!(needed.join_rules);
        assert_eq!(needed.member, vec!["@b:x".to_owned()]);
    }

    #[test]
    fn test_state_needed_deduplicates_members() {
        let invite = parse(json!({
            "event_id": "$invite-b:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.member",
            "state_key": "@b:x",
            "content": {"membership": "invite"},
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        }));
        let message = parse(json!({
            "event_id": "$msg:x",
            "room_id": "!r:x",
            "sender": "@a:x",
            "type": "m.room.message",
            "content": {"body": "hi"},
            "prev_events": ["$member-join-a-x:x"],
            "depth": 2,
        }));
        let needed = state_needed_for_auth(&[&invite, &message]);
        assert_eq!(needed.member, vec!["@a:x".to_owned(), "@b:x".to_owned()]);
        assert!(!needed.join_rules, "no join among the batch");
    }

    #[test]
    fn test_state_needed_covers_tuples_read_by_allowed() {
        // Every tuple the membership check reads is named by the
        // state-needed computation.
        let join = member_event("@b:x", "join", 2);
        let needed = state_needed_for_auth(&[&join]);
        let tuples = needed.tuples();
        assert!(tuples.contains(&(TimelineEventType::RoomCreate, String::new())));
        assert!(tuples.contains(&(TimelineEventType::RoomPowerLevels, String::new())));
        assert!(tuples.contains(&(TimelineEventType::RoomJoinRules, String::new())));
        assert!(tuples.contains(&(TimelineEventType::RoomMember, "@b:x".to_owned())));
    }
}
