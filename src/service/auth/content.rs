// =============================================================================
// Conclave Federated Room Server - Auth Content Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Typed extraction of the event content the authorization rules read:
//   create, membership, power levels and join rules, each with the
//   protocol's default values when the event or a field is absent.
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

use std::collections::BTreeMap;

use ruma::{events::room::member::MembershipState, OwnedEventId, OwnedRoomId, OwnedUserId};
use serde::Deserialize;
use serde_json::value::RawValue as RawJsonValue;

use super::AuthEvents;
use crate::{service::pdu::PduEvent, utils, Error, Result};

/// The parts of the `m.room.create` event the rules read, together with
/// the room id, event id and sender domain of the create event itself.
#[derive(Clone, Debug)]
pub struct CreateContent {
    pub creator: Option<OwnedUserId>,
    pub federate: Option<bool>,
    pub room_id: OwnedRoomId,
    pub event_id: OwnedEventId,
    pub sender_domain: String,
}

#[derive(Deserialize)]
struct ExtractCreate {
    #[serde(default)]
    creator: Option<OwnedUserId>,
    #[serde(default, rename = "m.federate")]
    federate: Option<bool>,
}

impl CreateContent {
    pub fn from_auth_events(auth_events: &dyn AuthEvents) -> Result<Self> {
        let event = auth_events
            .create()?
            .ok_or_else(|| Error::NotAllowed("missing m.room.create event".to_owned()))?;
        let extract: ExtractCreate = serde_json::from_str(event.content.get())
            .map_err(|e| Error::NotAllowed(format!("invalid m.room.create content: {e}")))?;
        let sender_domain = utils::domain_from_id(event.sender.as_str())?.to_owned();

        Ok(Self {
            creator: extract.creator,
            federate: extract.federate,
            room_id: event.room_id.clone(),
            event_id: event.event_id.clone(),
            sender_domain,
        })
    }

    /// Whether a server participates in the room under the `m.federate`
    /// flag. When federation is disabled only the creating server's domain
    /// may contribute events.
    pub fn domain_allowed(&self, domain: &str) -> Result<()> {
        if self.federate == Some(false) && domain != self.sender_domain {
            return Err(Error::NotAllowed(format!(
                "room is unfederated, {domain:?} may not participate"
            )));
        }
        Ok(())
    }

    pub fn user_id_allowed(&self, user_id: &str) -> Result<()> {
        self.domain_allowed(utils::domain_from_id(user_id)?)
    }
}

/// The parts of an `m.room.member` event content the rules read.
#[derive(Clone, Debug, Deserialize)]
pub struct MemberContent {
    pub membership: MembershipState,
    #[serde(default)]
    pub third_party_invite: Option<Box<RawJsonValue>>,
}

impl MemberContent {
    pub fn from_event(event: &PduEvent) -> Result<Self> {
        serde_json::from_str(event.content.get())
            .map_err(|e| Error::NotAllowed(format!("invalid m.room.member content: {e}")))
    }

    /// Membership of a user according to the auth events. A user without a
    /// member event has left (or never joined) the room.
    pub fn from_auth_events(auth_events: &dyn AuthEvents, user_id: &str) -> Result<Self> {
        match auth_events.member(user_id)? {
            Some(event) => Self::from_event(&event),
            None => Ok(Self {
                membership: MembershipState::Leave,
                third_party_invite: None,
            }),
        }
    }
}

/// Extracts the token from a `third_party_invite` content block.
pub fn third_party_invite_token(data: &RawJsonValue) -> Result<String> {
    #[derive(Deserialize)]
    struct Signed {
        #[serde(default)]
        token: String,
    }

    #[derive(Deserialize)]
    struct ExtractThirdPartyInvite {
        signed: Signed,
    }

    let extract: ExtractThirdPartyInvite = serde_json::from_str(data.get())
        .map_err(|e| Error::InvalidEvent(format!("invalid third_party_invite content: {e}")))?;
    if extract.signed.token.is_empty() {
        return Err(Error::InvalidEvent(
            "missing 'third_party_invite.signed.token' JSON key".to_owned(),
        ));
    }
    Ok(extract.signed.token)
}

/// The `m.room.power_levels` content with every omitted field resolved to
/// its default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerLevelContent {
    pub ban_level: i64,
    pub invite_level: i64,
    pub kick_level: i64,
    pub redact_level: i64,
    pub state_default_level: i64,
    pub event_default_level: i64,
    pub user_default_level: i64,
    pub event_levels: BTreeMap<String, i64>,
    pub user_levels: BTreeMap<String, i64>,
}

#[derive(Deserialize)]
struct ExtractPowerLevels {
    #[serde(default)]
    ban: Option<i64>,
    #[serde(default)]
    invite: Option<i64>,
    #[serde(default)]
    kick: Option<i64>,
    #[serde(default)]
    redact: Option<i64>,
    #[serde(default)]
    state_default: Option<i64>,
    #[serde(default)]
    events_default: Option<i64>,
    #[serde(default)]
    users_default: Option<i64>,
    #[serde(default)]
    events: BTreeMap<String, i64>,
    #[serde(default)]
    users: BTreeMap<String, i64>,
}

impl PowerLevelContent {
    pub fn defaults() -> Self {
        Self {
            ban_level: 50,
            invite_level: 50,
            kick_level: 50,
            redact_level: 50,
            state_default_level: 50,
            event_default_level: 0,
            user_default_level: 0,
            event_levels: BTreeMap::new(),
            user_levels: BTreeMap::new(),
        }
    }

    pub fn from_event(event: &PduEvent) -> Result<Self> {
        let extract: ExtractPowerLevels = serde_json::from_str(event.content.get())
            .map_err(|e| Error::NotAllowed(format!("invalid m.room.power_levels content: {e}")))?;

        let mut content = Self::defaults();
        if let Some(level) = extract.ban {
            content.ban_level = level;
        }
        if let Some(level) = extract.invite {
            content.invite_level = level;
        }
        if let Some(level) = extract.kick {
            content.kick_level = level;
        }
        if let Some(level) = extract.redact {
            content.redact_level = level;
        }
        if let Some(level) = extract.state_default {
            content.state_default_level = level;
        }
        if let Some(level) = extract.events_default {
            content.event_default_level = level;
        }
        if let Some(level) = extract.users_default {
            content.user_default_level = level;
        }
        content.event_levels = extract.events;
        content.user_levels = extract.users;
        Ok(content)
    }

    /// Power levels according to the auth events. A room without a power
    /// levels event gives the creator level 100 and everyone else the
    /// defaults.
    pub fn from_auth_events(
        auth_events: &dyn AuthEvents,
        creator: Option<&OwnedUserId>,
    ) -> Result<Self> {
        match auth_events.power_levels()? {
            Some(event) => Self::from_event(&event),
            None => {
                let mut content = Self::defaults();
                if let Some(creator) = creator {
                    content.user_levels.insert(creator.as_str().to_owned(), 100);
                }
                Ok(content)
            }
        }
    }

    pub fn user_level(&self, user_id: &str) -> i64 {
        self.user_levels
            .get(user_id)
            .copied()
            .unwrap_or(self.user_default_level)
    }

    /// Level needed to send an event of the given type. A per-type entry
    /// applies to both the state and non-state form of the type; without an
    /// entry the state or event default applies.
    pub fn event_level(&self, event_type: &str, is_state: bool) -> i64 {
        if let Some(level) = self.event_levels.get(event_type) {
            return *level;
        }
        if is_state {
            self.state_default_level
        } else {
            self.event_default_level
        }
    }
}

/// The `m.room.join_rules` content.
#[derive(Clone, Debug, Deserialize)]
pub struct JoinRuleContent {
    pub join_rule: String,
}

impl Default for JoinRuleContent {
    fn default() -> Self {
        Self {
            join_rule: "invite".to_owned(),
        }
    }
}

impl JoinRuleContent {
    pub fn from_auth_events(auth_events: &dyn AuthEvents) -> Result<Self> {
        match auth_events.join_rules()? {
            Some(event) => serde_json::from_str(event.content.get())
                .map_err(|e| Error::NotAllowed(format!("invalid m.room.join_rules content: {e}"))),
            None => Ok(Self::default()),
        }
    }
}
